//! # Broadcast
//!
//! 坐标变换广播模块。
//!
//! 负责：
//! - 监听变换树的每次更新
//! - 发布过程不阻塞回放主循环
//! - 慢消费者来不及处理的更新直接丢弃并计数

mod channel;
mod log;
pub mod metrics;

pub use channel::{BroadcastWorker, ChannelBroadcaster};
pub use log::LogBroadcaster;
pub use metrics::{BroadcastMetrics, MetricsSnapshot};

use contracts::{BroadcastConfig, BroadcastSinkType, TransformObserver};

/// Observer to attach to the synchronizer, plus its worker when asynchronous
pub struct Broadcaster {
    pub observer: Box<dyn TransformObserver>,
    pub worker: Option<BroadcastWorker>,
}

/// Build the configured broadcaster; `None` when broadcast is disabled
///
/// Channel broadcasters forward to a [`LogBroadcaster`] on a tokio task and
/// therefore need a running runtime.
pub fn create_broadcaster(config: &BroadcastConfig) -> Option<Broadcaster> {
    if !config.enabled {
        return None;
    }

    let broadcaster = match config.sink_type {
        BroadcastSinkType::Log => Broadcaster {
            observer: Box::new(LogBroadcaster::new("tf_log")),
            worker: None,
        },
        BroadcastSinkType::Channel => {
            let (observer, worker) = ChannelBroadcaster::spawn(
                "tf_channel",
                config.queue_capacity,
                LogBroadcaster::new("tf_channel_consumer"),
            );
            Broadcaster {
                observer: Box::new(observer),
                worker: Some(worker),
            }
        }
    };
    Some(broadcaster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_builds_nothing() {
        assert!(create_broadcaster(&BroadcastConfig::default()).is_none());
    }

    #[test]
    fn test_log_broadcaster_is_synchronous() {
        let config = BroadcastConfig {
            enabled: true,
            ..Default::default()
        };
        let broadcaster = create_broadcaster(&config).unwrap();
        assert_eq!(broadcaster.observer.name(), "tf_log");
        assert!(broadcaster.worker.is_none());
    }

    #[tokio::test]
    async fn test_channel_broadcaster_has_worker() {
        let config = BroadcastConfig {
            enabled: true,
            sink_type: BroadcastSinkType::Channel,
            queue_capacity: 4,
        };
        let broadcaster = create_broadcaster(&config).unwrap();
        assert_eq!(broadcaster.observer.name(), "tf_channel");

        let worker = broadcaster.worker.unwrap();
        drop(broadcaster.observer);
        assert_eq!(worker.join().await, 0);
    }
}
