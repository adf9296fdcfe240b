use super::ScoreEvent;

/// Keep only the events that are currently in progress, preserving order.
pub fn filter_live(events: Vec<ScoreEvent>) -> Vec<ScoreEvent> {
    events.into_iter().filter(ScoreEvent::is_live).collect()
}
