// 冷却跟踪
// (供应商, 消费者) 对上次通知时间的窗口化去重

use std::collections::HashMap;
use std::sync::Mutex;

/// 通知冷却跟踪器
///
/// 没有记录即视为"从未通知过、现在可以通知"。
/// 结构级互斥保证并发任务下不损坏；同一键只会被
/// 该键对应的邻近检查写入，跨任务无同键竞争。
#[derive(Debug, Default)]
pub struct CooldownTracker {
    entries: Mutex<HashMap<(String, String), i64>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 若该对不在冷却期则记录本次通知并返回true；否则不改状态返回false
    pub fn try_consume(
        &self,
        vendor_id: &str,
        consumer_id: &str,
        now_ms: i64,
        window_ms: i64,
    ) -> bool {
        let key = (vendor_id.to_string(), consumer_id.to_string());
        let mut entries = self.entries.lock().unwrap();

        match entries.get(&key) {
            Some(&last) if now_ms - last <= window_ms => false,
            _ => {
                entries.insert(key, now_ms);
                true
            }
        }
    }

    /// 清掉早于窗口的记录，防止条目无限增长
    pub fn sweep(&self, now_ms: i64, window_ms: i64) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, &mut last| now_ms - last <= window_ms);
    }

    /// 当前处于冷却期的对数
    pub fn active_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// 清空全部记录（测试用）
    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
    }
}
