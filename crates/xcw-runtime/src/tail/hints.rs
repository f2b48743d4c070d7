/// Advisory strings helping automated consumers scope their parsing.
/// Emitted once per tail inside the `agent_hints` event.
pub fn default_hints() -> Vec<String> {
    vec![
        "Parse stdout as NDJSON; one JSON object per line".to_string(),
        "Correlate events by tail_id and keep only the latest session".to_string(),
        "session_start with alert=APP_RELAUNCHED means prior context is stale".to_string(),
        "clear_buffer advises discarding buffered log context".to_string(),
        "heartbeat means the stream is alive but idle".to_string(),
        "cutoff_reached is terminal; expect a clean exit afterwards".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_are_nonempty() {
        assert!(!default_hints().is_empty());
    }
}
