use std::time::{Duration, Instant};

pub const STATS_ENV: &str = "KMER_TOP_STATS";

pub fn stats_enabled() -> bool {
    matches!(std::env::var(STATS_ENV).as_deref(), Ok("1"))
}

pub fn log_stage(stats: bool, name: &str, t: Instant) {
    if stats {
        eprintln!("KMER_TOP_STATS stage={} time={}", name, fmt_dur(t.elapsed()));
    }
}

pub fn fmt_dur(d: Duration) -> String {
    if d.as_secs_f64() < 1.0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.3}s", d.as_secs_f64())
    }
}
