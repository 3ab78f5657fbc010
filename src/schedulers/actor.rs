use crate::schedulers::ticker::Ticker;
use crate::schedulers::ticker_message::TickerCommand;
use crate::schedulers::timer::TTimer;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

/// One real-time tick = 100 ms.
/// PROBE_INTERVAL_TICKS (10) × TICK_PERIOD_MS (100 ms) = 1 s per probe round.
pub const TICK_PERIOD_MS: u64 = 100;

/// Converts a protocol period in milliseconds to whole ticks, at least one.
pub(crate) fn ticks_for(period: Duration) -> u32 {
    let ticks = period.as_millis().div_ceil(TICK_PERIOD_MS as u128);
    ticks.clamp(1, u32::MAX as u128) as u32
}

pub async fn run_scheduling_actor<T>(
    sender: mpsc::Sender<impl From<T::Callback>>,
    mut mailbox: mpsc::Receiver<TickerCommand<T>>,
    protocol_period: Duration,
) where
    T: TTimer,
{
    let mut interval = time::interval(Duration::from_millis(TICK_PERIOD_MS));
    let mut ticker = Ticker::<T>::with_protocol_period(ticks_for(protocol_period));

    loop {
        tokio::select! {
            biased;
            _ = interval.tick() => {
                for event in ticker.advance_clock() {
                    if sender.send(event.into()).await.is_err() {
                        tracing::debug!("Scheduler receiver dropped, stopping");
                        return;
                    }
                }
            }

            cmd = mailbox.recv() => {
                match cmd {
                    #[cfg(test)]
                    Some(TickerCommand::ForceTick) => {
                        for event in ticker.advance_clock() {
                            let _ = sender.send(event.into()).await;
                        }
                    }
                    Some(TickerCommand::Schedule(timer_cmd)) => {
                        ticker.apply(timer_cmd);
                    }
                    Some(TickerCommand::SetProtocolPeriod(ticks)) => {
                        tracing::info!("Protocol period set to {} tick(s)", ticks);
                        ticker.set_protocol_period(ticks);
                    }
                    None => return,
                }
            }
        }
    }
}
