//! Identity resolution: reference cleanup, the shared cache, and the
//! cross-source mapping chain.

pub mod cache;
pub mod mapper;
pub mod normalizer;

pub use cache::{CacheFileError, CacheOutcome, Claim, ClaimGuard, IdentityCache, Waiter};
pub use mapper::{CrossSourceMapper, MapAttempt, Mapped};
pub use normalizer::{
    DropReason, NormalizedReference, is_low_info_title, merge_references, normalize, title_key,
};
