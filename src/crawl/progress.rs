//! Per-layer progress bars.

use indicatif::{ProgressBar, ProgressStyle};

/// A bar counting finished tasks for one phase of a layer.
///
/// Returns a hidden bar when progress output is off, so callers never branch.
pub(crate) fn layer_bar(enabled: bool, depth: u32, len: usize, phase: &'static str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(u64::try_from(len).unwrap_or(u64::MAX));
    bar.set_style(
        ProgressStyle::with_template("{prefix:>8} [{bar:32}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_prefix(format!("layer {depth}"));
    bar.set_message(phase);
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_bar_is_hidden() {
        let bar = layer_bar(false, 1, 10, "mapping");
        assert!(bar.is_hidden());
        bar.inc(3);
        assert_eq!(bar.position(), 3);
    }

    #[test]
    fn test_enabled_bar_has_length() {
        let bar = layer_bar(true, 2, 7, "fetching reference lists");
        assert_eq!(bar.length(), Some(7));
        bar.finish_and_clear();
    }
}
