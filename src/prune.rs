//! Citation-count pruning.
//!
//! Two stages, each independently switchable:
//! - pre-mapping: drop a reference whose origin already reports a count
//!   below the threshold, before any mapping call is spent on it
//! - post-mapping: compare the canonical count; below the threshold the node
//!   is either removed with its edge (aggressive) or kept but not expanded
//!
//! The seed (depth 0) is exempt from both stages.

use crate::config::CrawlConfig;

/// Outcome of the post-mapping stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostDecision {
    /// Keep the node and expand it in the next layer.
    KeepAndExpand,
    /// Keep the node and its edge, but do not expand it.
    KeepLeaf,
    /// Remove the node and its edge.
    Drop,
}

impl PostDecision {
    /// True unless the node is dropped.
    #[must_use]
    pub fn keeps(self) -> bool {
        !matches!(self, Self::Drop)
    }
}

/// Pruning configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrunePolicy {
    pub threshold: u64,
    pub pre_mapping: bool,
    pub post_mapping: bool,
    pub aggressive: bool,
    pub strict: bool,
    pub keep_unmapped: bool,
}

impl From<&CrawlConfig> for PrunePolicy {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            threshold: config.min_citations,
            pre_mapping: config.pre_prune,
            post_mapping: config.post_prune,
            aggressive: config.aggressive_prune,
            strict: config.strict_threshold,
            keep_unmapped: config.keep_unmapped,
        }
    }
}

impl PrunePolicy {
    /// Pre-mapping stage: returns false if the reference should be dropped
    /// before mapping. Only an origin-reported count can trigger a drop.
    #[must_use]
    pub fn keep_before_mapping(&self, depth: u32, reported_count: Option<u64>) -> bool {
        if depth == 0 || !self.pre_mapping {
            return true;
        }
        reported_count.is_none_or(|count| count >= self.threshold)
    }

    /// Post-mapping stage for a mapped work with canonical count `count`.
    #[must_use]
    pub fn after_mapping(&self, depth: u32, count: Option<u64>) -> PostDecision {
        if depth == 0 {
            return PostDecision::KeepAndExpand;
        }
        match count {
            None if self.strict => PostDecision::Drop,
            None => PostDecision::KeepAndExpand,
            Some(_) if !self.post_mapping => PostDecision::KeepAndExpand,
            Some(count) if count >= self.threshold => PostDecision::KeepAndExpand,
            Some(_) if self.aggressive => PostDecision::Drop,
            Some(_) => PostDecision::KeepLeaf,
        }
    }

    /// Decision for a reference the mapper could not resolve.
    #[must_use]
    pub fn for_unmapped(&self) -> PostDecision {
        if self.keep_unmapped && !self.strict {
            PostDecision::KeepAndExpand
        } else {
            PostDecision::Drop
        }
    }
}
