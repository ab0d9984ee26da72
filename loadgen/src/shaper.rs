use crate::config::{clamp_rate, period, LoadProfile, LINE_RAMP_WINDOW};
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Emits the temporal sequence of "dispatch now" signals for one profile.
///
/// Every wait is itself a cancellation point, so a stop request is observed
/// within at most one pacing interval. The `line` profile deliberately keeps
/// emitting at the terminal rate after the ramp window elapses; ending the
/// run there is the caller's job (stop or cancellation).
pub struct Shaper {
    cancel: CancellationToken,
    state: State,
}

enum State {
    Boot(LoadProfile),
    /// Fixed-period pacing: `const`, and `line` after its ramp window.
    Paced(Interval),
    Ramp {
        from: f64,
        to: f64,
        started: Instant,
    },
    Step {
        current: i64,
        to: i64,
        step: i64,
        hold: Duration,
        interval: Interval,
        plateau_ends: Instant,
    },
    Once {
        remaining: u64,
    },
    Unlimited,
    Done,
}

impl Shaper {
    pub fn new(profile: LoadProfile, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            state: State::Boot(profile),
        }
    }

    /// Waits until the next emission is due. Returns `false` once the profile
    /// is exhausted or the run is cancelled; stays `false` afterwards.
    pub async fn next(&mut self) -> bool {
        loop {
            let state = std::mem::replace(&mut self.state, State::Done);
            let (next, emitted) = self.advance(state).await;
            self.state = next;
            if let Some(emitted) = emitted {
                return emitted;
            }
        }
    }

    async fn advance(&self, state: State) -> (State, Option<bool>) {
        if self.cancel.is_cancelled() {
            return (State::Done, Some(false));
        }

        match state {
            State::Boot(profile) => (self.init(profile).await, None),

            State::Paced(mut interval) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => (State::Done, Some(false)),
                    _ = interval.tick() => (State::Paced(interval), Some(true)),
                }
            }

            State::Ramp { from, to, started } => {
                let elapsed = started.elapsed();
                if elapsed >= LINE_RAMP_WINDOW {
                    let rate = clamp_rate(to.round() as i64);
                    debug!(rate, "ramp window elapsed, holding terminal rate");
                    return (State::Paced(paced(period(rate)).await), None);
                }

                let progress = elapsed.as_secs_f64() / LINE_RAMP_WINDOW.as_secs_f64();
                let rate = (from + (to - from) * progress).max(1.0);
                let pause = Duration::from_secs_f64(1.0 / rate);
                tokio::select! {
                    _ = self.cancel.cancelled() => (State::Done, Some(false)),
                    _ = sleep(pause) => (State::Ramp { from, to, started }, Some(true)),
                }
            }

            State::Step {
                current,
                to,
                step,
                hold,
                mut interval,
                plateau_ends,
            } => {
                tokio::select! {
                    _ = self.cancel.cancelled() => (State::Done, Some(false)),
                    _ = sleep_until(plateau_ends) => {
                        if step == 0 && current != to {
                            debug!(current, to, "zero step cannot reach target rate, ending profile");
                            return (State::Done, Some(false));
                        }
                        let next = current + step;
                        if next > to {
                            return (State::Done, Some(false));
                        }
                        let rate = clamp_rate(next);
                        info!(rate, hold_secs = hold.as_secs(), "step plateau");
                        (
                            State::Step {
                                current: next,
                                to,
                                step,
                                hold,
                                interval: paced(period(rate)).await,
                                plateau_ends: Instant::now() + hold,
                            },
                            None,
                        )
                    }
                    _ = interval.tick() => (
                        State::Step { current, to, step, hold, interval, plateau_ends },
                        Some(true),
                    ),
                }
            }

            State::Once { remaining } => {
                if remaining == 0 {
                    (State::Done, Some(false))
                } else {
                    (
                        State::Once {
                            remaining: remaining - 1,
                        },
                        Some(true),
                    )
                }
            }

            State::Unlimited => (State::Unlimited, Some(true)),

            State::Done => (State::Done, Some(false)),
        }
    }

    async fn init(&self, profile: LoadProfile) -> State {
        match profile {
            LoadProfile::Const { rate } => State::Paced(paced(period(rate)).await),
            LoadProfile::Line { from, to } => State::Ramp {
                from,
                to,
                started: Instant::now(),
            },
            LoadProfile::Step {
                from,
                to,
                step,
                hold,
            } => {
                if from > to {
                    return State::Done;
                }
                let rate = clamp_rate(from);
                info!(rate, hold_secs = hold.as_secs(), "step plateau");
                State::Step {
                    current: from,
                    to,
                    step,
                    hold,
                    interval: paced(period(rate)).await,
                    plateau_ends: Instant::now() + hold,
                }
            }
            LoadProfile::Once { count } => State::Once { remaining: count },
            LoadProfile::Unlimited => State::Unlimited,
        }
    }
}

/// Interval whose first (instant) tick has already been consumed, so every
/// subsequent tick waits one full period.
async fn paced(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;
    interval
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shaper(profile: LoadProfile) -> (Shaper, CancellationToken) {
        let cancel = CancellationToken::new();
        (Shaper::new(profile, cancel.clone()), cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn const_profile_paces_at_fixed_rate() {
        let (mut shaper, _cancel) = shaper(LoadProfile::Const { rate: 10 });
        let start = Instant::now();
        for _ in 0..20 {
            assert!(shaper.next().await);
        }
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(1900) && elapsed <= Duration::from_millis(2200),
            "20 emissions at 10/s took {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn once_profile_emits_exact_count() {
        let (mut shaper, _cancel) = shaper(LoadProfile::Once { count: 5 });
        for _ in 0..5 {
            assert!(shaper.next().await);
        }
        assert!(!shaper.next().await);
        assert!(!shaper.next().await);
    }

    #[tokio::test(start_paused = true)]
    async fn once_profile_with_zero_count_is_empty() {
        let (mut shaper, _cancel) = shaper(LoadProfile::Once { count: 0 });
        assert!(!shaper.next().await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_observed_before_waiting() {
        let (mut shaper, cancel) = shaper(LoadProfile::Const { rate: 1 });
        cancel.cancel();
        let start = Instant::now();
        assert!(!shaper.next().await);
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_pacing_wait() {
        let (mut shaper, cancel) = shaper(LoadProfile::Const { rate: 1 });
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let start = Instant::now();
        assert!(!shaper.next().await);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn step_profile_walks_three_plateaus() {
        let (mut shaper, _cancel) = shaper(LoadProfile::Step {
            from: 10,
            to: 30,
            step: 10,
            hold: Duration::from_secs(1),
        });
        let start = Instant::now();
        let mut emissions = 0u64;
        while shaper.next().await {
            emissions += 1;
        }
        let elapsed = start.elapsed();
        // Three 1s plateaus at nominal 10/20/30 emissions per second.
        assert!(
            elapsed >= Duration::from_millis(2900) && elapsed <= Duration::from_millis(3400),
            "plateaus took {elapsed:?}"
        );
        assert!(
            (54..=66).contains(&emissions),
            "expected roughly 60 emissions, got {emissions}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn step_profile_zero_step_terminates_early() {
        let (mut shaper, _cancel) = shaper(LoadProfile::Step {
            from: 10,
            to: 20,
            step: 0,
            hold: Duration::from_millis(500),
        });
        let start = Instant::now();
        let mut emissions = 0u64;
        while shaper.next().await {
            emissions += 1;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(emissions <= 6, "one plateau only, got {emissions}");
    }

    #[tokio::test(start_paused = true)]
    async fn step_profile_from_above_to_never_emits() {
        let (mut shaper, _cancel) = shaper(LoadProfile::Step {
            from: 50,
            to: 10,
            step: 10,
            hold: Duration::from_secs(1),
        });
        assert!(!shaper.next().await);
    }

    #[tokio::test(start_paused = true)]
    async fn line_ramp_accelerates_then_holds_terminal_rate() {
        let (mut shaper, _cancel) = shaper(LoadProfile::Line {
            from: 1.0,
            to: 100.0,
        });
        let start = Instant::now();
        let mut stamps = vec![];
        while start.elapsed() < Duration::from_secs(11) {
            assert!(shaper.next().await);
            stamps.push(start.elapsed());
        }
        assert!(stamps.len() > 100);
        let first_gap = stamps[1] - stamps[0];
        let last_gap = stamps[stamps.len() - 1] - stamps[stamps.len() - 2];
        assert!(first_gap > last_gap, "{first_gap:?} vs {last_gap:?}");
        // Past the ramp window the pacing settles on the terminal rate.
        assert!(last_gap <= Duration::from_millis(15), "{last_gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn line_ramp_clamps_degenerate_rates() {
        let (mut shaper, _cancel) = shaper(LoadProfile::Line { from: -5.0, to: 0.0 });
        let start = Instant::now();
        for _ in 0..3 {
            assert!(shaper.next().await);
        }
        // Clamped to 1/s, never a zero or negative period.
        assert!(start.elapsed() >= Duration::from_millis(2900));
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_profile_emits_until_cancelled() {
        let (mut shaper, cancel) = shaper(LoadProfile::Unlimited);
        for _ in 0..1000 {
            assert!(shaper.next().await);
        }
        cancel.cancel();
        assert!(!shaper.next().await);
    }
}
