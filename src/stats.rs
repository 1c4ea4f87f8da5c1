/// Stats extraction: pull Scrapy's closing stats dump out of a crawl log.
///
/// Scrapy logs `[scrapy.statscollectors] INFO: Dumping Scrapy stats:` right
/// before it exits, followed by a pretty-printed dict. Everything from that
/// line's severity tag to the end of the log is the stats block.
use regex::Regex;
use std::sync::LazyLock;

/// Returned when the log carries no stats dump.
pub const EXTRACT_ERROR: &str = "Error postprocessing Scrapy log!";

static STATS_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    // (?s): the block spans lines.
    Regex::new(r"(?s)INFO: Dumping Scrapy stats:.*").unwrap()
});

/// Return the stats block, or [`EXTRACT_ERROR`] if there is none.
pub fn extract_stats(log: Option<&str>) -> &str {
    let found = log.and_then(|text| STATS_MARKER.find(text));
    match found {
        Some(m) => m.as_str(),
        None => {
            tracing::warn!("no stats dump found in crawler output");
            EXTRACT_ERROR
        }
    }
}
