use core_types::LoopStage;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Where the loop currently is, as published to the heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub loop_index: u32,
    pub max_loops: u32,
    pub stage: LoopStage,
}

/// Logs the latest `Progress` every `interval` until the sender is dropped.
///
/// The task only observes; it never steers the loop.
pub fn spawn_heartbeat(interval: Duration, mut progress: watch::Receiver<Progress>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let current = *progress.borrow();
                    tracing::info!(
                        loop_index = current.loop_index,
                        max_loops = current.max_loops,
                        stage = %current.stage,
                        "Heartbeat"
                    );
                }
                changed = progress.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_when_the_loop_goes_away() {
        let (tx, rx) = watch::channel(Progress {
            loop_index: 0,
            max_loops: 3,
            stage: LoopStage::Init,
        });
        let handle = spawn_heartbeat(Duration::from_millis(10), rx);

        tx.send_replace(Progress {
            loop_index: 1,
            max_loops: 3,
            stage: LoopStage::Run,
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("heartbeat should stop")
            .unwrap();
    }
}
