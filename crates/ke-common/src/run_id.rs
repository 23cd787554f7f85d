//! 収集 run の識別子
//!
//! `Collector::run` ごとに新しい ULID を振り、ログ行と集計を結び付ける。
//! ULID は生成時刻順に並ぶ。

use once_cell::sync::Lazy;
use ulid::Ulid;

static PROCESS_RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// このプロセスから起動した run すべてに共通の id
#[inline]
pub fn process() -> &'static str {
    &PROCESS_RUN_ID
}

/// 1 回の収集用の新しい id
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_id_is_stable() {
        assert_eq!(process(), process());
        assert_eq!(process().len(), 26);
    }

    #[test]
    fn run_ids_are_unique_and_time_ordered() {
        let older = generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = generate();
        assert_ne!(older, newer);
        assert!(older < newer);
    }
}
