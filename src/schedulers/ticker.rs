use crate::schedulers::{ticker_message::TimerCommand, timer::TTimer};
use std::collections::HashMap;

#[cfg(test)]
use std::net::SocketAddr;

#[cfg(test)]
pub(crate) const PROBE_INTERVAL_TICKS: u32 = 10; // 10 × 100ms = 1s
pub(crate) const DIRECT_ACK_TIMEOUT_TICKS: u32 = 3; // 3 × 100ms = 300ms
pub(crate) const INDIRECT_ACK_TIMEOUT_TICKS: u32 = 3; // 3 × 100ms = 300ms
pub(crate) const SUSPECT_TIMEOUT_TICKS: u32 = 50; // 50 × 100ms = 5s

#[derive(Debug)]
pub(crate) struct Ticker<T> {
    protocol_elapsed: u32,
    protocol_period: u32,
    timers: HashMap<u32, T>,
}

impl<T> Ticker<T>
where
    T: TTimer,
{
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::with_protocol_period(PROBE_INTERVAL_TICKS)
    }

    pub(crate) fn with_protocol_period(ticks: u32) -> Self {
        Self {
            protocol_elapsed: 0,
            protocol_period: ticks.max(1),
            timers: Default::default(),
        }
    }

    pub(crate) fn apply(&mut self, cmd: TimerCommand<T>) {
        match cmd {
            TimerCommand::SetSchedule { seq, timer } => {
                self.timers.insert(seq, timer);
            }

            TimerCommand::CancelSchedule { seq } => {
                self.timers.remove(&seq);
            }
        }
    }

    pub(crate) fn set_protocol_period(&mut self, ticks: u32) {
        self.protocol_period = ticks.max(1);
        self.protocol_elapsed = self.protocol_elapsed.min(self.protocol_period - 1);
    }

    pub fn advance_clock(&mut self) -> Vec<T::Callback> {
        let mut events = Vec::new();

        // 1. Age every in-flight timer
        let mut timeout_seqs: Vec<u32> = vec![];
        for (seq, timer) in self.timers.iter_mut() {
            if timer.tick() == 0 {
                timeout_seqs.push(*seq);
            }
        }

        for seq in timeout_seqs {
            if let Some(timer) = self.timers.remove(&seq) {
                events.push(timer.to_timeout_callback(seq));
            }
        }

        // 2. Advance the protocol clock
        self.protocol_elapsed += 1;
        if self.protocol_elapsed >= self.protocol_period {
            self.protocol_elapsed = 0;
            events.push(Default::default());
        }

        events
    }

    #[cfg(test)]
    pub fn probe_seq_for(&self, target: SocketAddr) -> Option<u32> {
        self.timers
            .iter()
            .find(|(_, timer)| timer.target() == Some(target))
            .map(|(&seq, _)| seq)
    }

    #[cfg(test)]
    pub fn has_timer(&self, seq: u32) -> bool {
        self.timers.contains_key(&seq)
    }
}

#[cfg(test)]
mod tests {

    use crate::clusters::swims::{ProbePhase, SwimTimeOutCallback, SwimTimer};

    use super::*;

    fn target() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn no_protocol_period_before_interval_elapses() {
        let mut ticker = Ticker::<SwimTimer>::new();
        for _ in 0..PROBE_INTERVAL_TICKS - 1 {
            let events = ticker.advance_clock();
            assert!(
                !events
                    .iter()
                    .any(|e| matches!(e, SwimTimeOutCallback::ProtocolPeriodElapsed)),
            );
        }
    }

    #[test]
    fn protocol_period_fires_at_interval() {
        let mut ticker = Ticker::<SwimTimer>::new();
        for _ in 0..PROBE_INTERVAL_TICKS - 1 {
            ticker.advance_clock();
        }
        let events = ticker.advance_clock();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SwimTimeOutCallback::ProtocolPeriodElapsed))
        );
    }

    #[test]
    fn shorter_protocol_period_takes_effect() {
        let mut ticker = Ticker::<SwimTimer>::new();
        for _ in 0..5 {
            ticker.advance_clock();
        }
        ticker.set_protocol_period(2);

        let events = ticker.advance_clock();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SwimTimeOutCallback::ProtocolPeriodElapsed))
        );
        assert!(ticker.advance_clock().is_empty());
        assert_eq!(ticker.advance_clock().len(), 1);
    }

    #[test]
    fn zero_protocol_period_is_clamped() {
        let mut ticker = Ticker::<SwimTimer>::with_protocol_period(0);
        assert_eq!(ticker.advance_clock().len(), 1);
        assert_eq!(ticker.advance_clock().len(), 1);
    }

    #[test]
    fn direct_probe_timeout() {
        let mut ticker = Ticker::<SwimTimer>::new();
        ticker.apply(TimerCommand::SetSchedule {
            seq: 1,
            timer: SwimTimer::direct_probe(target()),
        });
        assert_eq!(ticker.probe_seq_for(target()), Some(1));

        for _ in 0..DIRECT_ACK_TIMEOUT_TICKS - 1 {
            let events = ticker.advance_clock();
            assert!(!events.iter().any(|e| matches!(
                e,
                SwimTimeOutCallback::TimedOut {
                    phase: ProbePhase::Direct,
                    ..
                }
            )));
        }

        let events = ticker.advance_clock();
        assert!(events.iter().any(|e| matches!(
            e,
            SwimTimeOutCallback::TimedOut {
                phase: ProbePhase::Direct,
                seq: 1,
                ..
            }
        )));
        assert!(!ticker.has_timer(1));
    }

    #[test]
    fn indirect_probe_timeout() {
        let mut ticker = Ticker::<SwimTimer>::new();
        ticker.apply(TimerCommand::SetSchedule {
            seq: 2,
            timer: SwimTimer::indirect_probe(target()),
        });

        for _ in 0..INDIRECT_ACK_TIMEOUT_TICKS - 1 {
            ticker.advance_clock();
        }

        let events = ticker.advance_clock();
        assert!(events.iter().any(|e| matches!(
            e,
            SwimTimeOutCallback::TimedOut {
                phase: ProbePhase::Indirect,
                seq: 2,
                ..
            }
        )));
    }

    #[test]
    fn cancel_probe_prevents_timeout() {
        let mut ticker = Ticker::<SwimTimer>::new();
        ticker.apply(TimerCommand::SetSchedule {
            seq: 1,
            timer: SwimTimer::direct_probe(target()),
        });
        ticker.apply(TimerCommand::CancelSchedule { seq: 1 });

        for _ in 0..DIRECT_ACK_TIMEOUT_TICKS + 1 {
            let events = ticker.advance_clock();
            assert!(!events.iter().any(|e| matches!(
                e,
                SwimTimeOutCallback::TimedOut {
                    phase: ProbePhase::Direct,
                    ..
                }
            )));
        }
    }

    #[test]
    fn suspect_timer_fires_after_timeout() {
        let mut ticker = Ticker::<SwimTimer>::new();
        let seq = 1;
        ticker.apply(TimerCommand::SetSchedule {
            timer: SwimTimer::suspect_timer(target()),
            seq,
        });

        for _ in 0..SUSPECT_TIMEOUT_TICKS - 1 {
            let events = ticker.advance_clock();
            assert!(!events.iter().any(|e| matches!(
                e,
                SwimTimeOutCallback::TimedOut {
                    phase: ProbePhase::Suspect,
                    ..
                }
            )));
        }

        let events = ticker.advance_clock();

        assert!(events.iter().any(|e| matches!(
            e,
            SwimTimeOutCallback::TimedOut {
                phase: ProbePhase::Suspect,
                ..
            }
        )));
        assert!(
            !ticker.has_timer(seq),
            "There shouldn't be any existing suspect"
        );
    }
}
