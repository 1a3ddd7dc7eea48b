//! Human-like page interaction after a successful fetch
//!
//! Runs a short random sequence of scrolls, pointer movement, hovers and
//! reading pauses. Every action is best-effort.

use log::{debug, warn};
use rand::Rng;
use std::time::Duration;

use crate::browser::BrowsingSession;

const MAX_READING_PAUSE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    ScrollDown,
    ScrollUp,
    MouseWiggle,
    Hover,
    Read,
}

const ACTIONS: [Action; 5] = [
    Action::ScrollDown,
    Action::ScrollUp,
    Action::MouseWiggle,
    Action::Hover,
    Action::Read,
];

fn scroll_script(distance: i32) -> String {
    format!("window.scrollBy({{ top: {distance}, behavior: 'smooth' }}); true")
}

fn mouse_script(x: u32, y: u32) -> String {
    format!(
        "document.dispatchEvent(new MouseEvent('mousemove', {{ clientX: {x}, clientY: {y}, bubbles: true }})); true"
    )
}

const HOVER_JS: &str = "(() => {
    const links = document.querySelectorAll('a, button');
    if (!links.length) return false;
    const el = links[Math.floor(Math.random() * links.length)];
    el.dispatchEvent(new MouseEvent('mouseover', { bubbles: true }));
    return true;
})()";

const TEXT_LENGTH_JS: &str = "document.body ? document.body.innerText.length : 0";

/// Reading pause: roughly 1s per 1000 characters, capped at 10s.
#[must_use]
pub fn reading_pause(text_len: u64) -> Duration {
    Duration::from_millis(text_len).min(MAX_READING_PAUSE)
}

/// Plan a sequence of 3 to 5 actions, each followed by a 0.5-2.0s pause.
fn plan() -> Vec<(Action, Duration, i32, (u32, u32))> {
    let mut rng = rand::rng();
    let count = rng.random_range(3..=5);
    (0..count)
        .map(|_| {
            let action = ACTIONS[rng.random_range(0..ACTIONS.len())];
            let pause = Duration::from_millis(rng.random_range(500..=2000));
            let distance = rng.random_range(200..=800);
            let point = (rng.random_range(50..=900), rng.random_range(50..=600));
            (action, pause, distance, point)
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BehaviorSimulator;

impl BehaviorSimulator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the number of actions that completed.
    pub async fn simulate<S: BrowsingSession>(&self, session: &S) -> usize {
        let steps = plan();
        let mut completed = 0;

        for (action, pause, distance, (x, y)) in steps {
            let result = match action {
                Action::ScrollDown => session.evaluate(&scroll_script(distance)).await.map(|_| ()),
                Action::ScrollUp => session.evaluate(&scroll_script(-distance)).await.map(|_| ()),
                Action::MouseWiggle => session.evaluate(&mouse_script(x, y)).await.map(|_| ()),
                Action::Hover => session.evaluate(HOVER_JS).await.map(|_| ()),
                Action::Read => match session.evaluate(TEXT_LENGTH_JS).await {
                    Ok(len) => {
                        tokio::time::sleep(reading_pause(len.as_u64().unwrap_or(0))).await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                },
            };

            match result {
                Ok(()) => completed += 1,
                Err(e) => warn!("Behavior action {action:?} failed: {e}"),
            }
            tokio::time::sleep(pause).await;
        }

        debug!("Behavior simulation completed {completed} actions");
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_pause_is_capped() {
        assert_eq!(reading_pause(2500), Duration::from_millis(2500));
        assert_eq!(reading_pause(250_000), Duration::from_secs(10));
    }

    #[test]
    fn test_plan_size_and_pauses() {
        for _ in 0..20 {
            let steps = plan();
            assert!((3..=5).contains(&steps.len()));
            for (_, pause, _, _) in steps {
                assert!(pause >= Duration::from_millis(500) && pause <= Duration::from_secs(2));
            }
        }
    }
}
