//! 回放指标收集模块
//!
//! 通过 metrics facade 记录 spin 管道的计数器、仪表和直方图，
//! 并在内存中聚合，供运行结束时输出摘要。

use std::collections::HashMap;

use contracts::TransformedSpin;
use metrics::{counter, gauge, histogram};

/// 记录一个已发出的 spin
///
/// `wait_s` 为 spin 结束到被释放之间的日志时间 (秒)。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_spin_emitted;
///
/// if synchronizer.next_spin()? {
///     let spin = synchronizer.get_spin().unwrap();
///     record_spin_emitted(spin, stream_time - spin.end);
/// }
/// ```
pub fn record_spin_emitted(spin: &TransformedSpin, wait_s: f64) {
    counter!(
        "spin_playback_spins_emitted_total",
        "mode" => spin.localization_mode.as_str()
    )
    .increment(1);
    gauge!("spin_playback_last_spin_sequence").set(spin.sequence as f64);
    histogram!("spin_playback_spin_points").record(spin.len() as f64);
    histogram!("spin_playback_spin_duration_ms").record((spin.end - spin.start) * 1000.0);
    histogram!("spin_playback_transform_wait_ms").record(wait_s.max(0.0) * 1000.0);
}

/// 记录被丢弃的 spin
pub fn record_spin_discarded(reason: &'static str) {
    counter!("spin_playback_spins_discarded_total", "reason" => reason).increment(1);
}

/// 记录等待变换的 spin 数量
pub fn record_pending_depth(depth: usize) {
    gauge!("spin_playback_pending_spins").set(depth as f64);
}

/// 记录被拒绝的乱序变换样本
pub fn record_stale_update(child: &str) {
    counter!("spin_playback_stale_updates_total", "child" => child.to_string()).increment(1);
}

/// 记录从航位推算切换到校正定位
pub fn record_localization_switch(stamp: f64) {
    counter!("spin_playback_localization_switches_total").increment(1);
    gauge!("spin_playback_localization_switch_time").set(stamp);
}

/// 记录交给广播器的变换更新
pub fn record_transform_broadcast(observer: &str, delivered: bool) {
    let status = if delivered { "delivered" } else { "dropped" };
    counter!(
        "spin_playback_transforms_broadcast_total",
        "observer" => observer.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 回放指标聚合器
///
/// 在内存中聚合已发出 spin 的指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct PlaybackMetricsAggregator {
    pub total_spins: u64,

    pub total_points: u64,

    /// 各定位模式的 spin 数
    pub mode_counts: HashMap<&'static str, u64>,

    /// 每个 spin 的点数
    pub points_stats: RunningStats,

    /// spin 时长 (毫秒)
    pub duration_stats: RunningStats,

    /// spin 结束到释放的日志时间 (毫秒)
    pub wait_stats: RunningStats,

    /// 序号跳变次数
    pub sequence_gaps: u64,

    last_sequence: Option<u64>,
}

impl PlaybackMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用一个已发出的 spin 更新聚合统计
    pub fn update(&mut self, spin: &TransformedSpin, wait_s: f64) {
        self.total_spins += 1;
        self.total_points += spin.len() as u64;
        *self
            .mode_counts
            .entry(spin.localization_mode.as_str())
            .or_insert(0) += 1;

        self.points_stats.push(spin.len() as f64);
        self.duration_stats.push((spin.end - spin.start) * 1000.0);
        self.wait_stats.push(wait_s.max(0.0) * 1000.0);

        if let Some(last) = self.last_sequence {
            if spin.sequence != last + 1 {
                self.sequence_gaps += 1;
            }
        }
        self.last_sequence = Some(spin.sequence);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_spins: self.total_spins,
            total_points: self.total_points,
            sequence_gaps: self.sequence_gaps,
            points_per_spin: StatsSummary::from(&self.points_stats),
            spin_duration_ms: StatsSummary::from(&self.duration_stats),
            transform_wait_ms: StatsSummary::from(&self.wait_stats),
            mode_counts: self
                .mode_counts
                .iter()
                .map(|(mode, count)| (mode.to_string(), *count))
                .collect(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_spins: u64,
    pub total_points: u64,
    pub sequence_gaps: u64,
    pub points_per_spin: StatsSummary,
    pub spin_duration_ms: StatsSummary,
    pub transform_wait_ms: StatsSummary,
    pub mode_counts: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Playback Metrics Summary ===")?;
        writeln!(f, "Total spins: {}", self.total_spins)?;
        writeln!(f, "Total points: {}", self.total_points)?;
        writeln!(f, "Sequence gaps: {}", self.sequence_gaps)?;
        writeln!(f, "Points per spin: {}", self.points_per_spin)?;
        writeln!(f, "Spin duration (ms): {}", self.spin_duration_ms)?;
        writeln!(f, "Transform wait (ms): {}", self.transform_wait_ms)?;

        if !self.mode_counts.is_empty() {
            writeln!(f, "Spins by localization mode:")?;
            let mut modes: Vec<_> = self.mode_counts.iter().collect();
            modes.sort();
            for (mode, count) in modes {
                writeln!(f, "  {}: {}", mode, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线均值/方差 (Welford 算法)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
