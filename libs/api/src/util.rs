use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Текущее Unix-время в секундах (с дробной частью).
pub fn unix_now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Задержка между отправкой и приёмом, обе метки в Unix-секундах.
///
/// Часы разных процессов не синхронизированы: отрицательная разница
/// сводится к нулю.
pub fn latency_between(send_secs: f64, recv_secs: f64) -> Duration {
    Duration::try_from_secs_f64(recv_secs - send_secs).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_is_clamped_at_zero() {
        assert_eq!(latency_between(10.0, 10.25), Duration::from_millis(250));
        assert_eq!(latency_between(10.5, 10.0), Duration::ZERO);
    }

    #[test]
    fn now_is_after_2020() {
        assert!(unix_now_secs() > 1_577_836_800.0);
    }
}
