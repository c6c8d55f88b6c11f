//! 内存版 Outbox 存储（InMemoryOutboxStore）
//!
//! 以 `Mutex<BTreeMap>` 模拟两张日志表，满足 `OutboxStore`/`StoreSession`
//! 协议；会话内的写入先行暂存，`commit` 时整体生效，`rollback`/Drop 时
//! 整体丢弃。典型用途：测试环境、示例与单进程部署。
//!
use super::{NewRecord, OutboxRecord, OutboxStore, RecordKind, StoreSession};
use crate::error::{OutboxError, OutboxResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Table {
    /// sequence -> 行，BTreeMap 保证按位点升序遍历
    rows: BTreeMap<i64, OutboxRecord>,
    /// (topic, identity) -> sequence
    index: HashMap<(String, String), i64>,
}

impl Table {
    fn contains(&self, topic: &str, identity: &str) -> bool {
        self.index
            .contains_key(&(topic.to_string(), identity.to_string()))
    }

    fn insert(&mut self, sequence: i64, record: &NewRecord, now: DateTime<Utc>) {
        let key = (record.topic().to_string(), record.identity().to_string());
        let row = OutboxRecord::builder()
            .sequence(sequence)
            .identity(record.identity().to_string())
            .topic(record.topic().to_string())
            .retries(0)
            .content(record.content().clone())
            .created(now)
            .updated(now)
            .build();
        self.rows.insert(sequence, row);
        self.index.insert(key, sequence);
    }

    fn delete(&mut self, topic: &str, identity: &str) {
        let key = (topic.to_string(), identity.to_string());
        if let Some(sequence) = self.index.remove(&key) {
            self.rows.remove(&sequence);
        }
    }
}

#[derive(Default)]
struct Inner {
    sequence: i64,
    publish: Table,
    consume: Table,
}

impl Inner {
    fn table(&self, kind: RecordKind) -> &Table {
        match kind {
            RecordKind::Publish => &self.publish,
            RecordKind::Consume => &self.consume,
        }
    }

    fn table_mut(&mut self, kind: RecordKind) -> &mut Table {
        match kind {
            RecordKind::Publish => &mut self.publish,
            RecordKind::Consume => &mut self.consume,
        }
    }

    fn next_sequence(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }
}

/// 简单的内存 Outbox 存储实现
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前表内容快照（按 sequence 升序；观测/断言用）
    pub fn snapshot(&self, kind: RecordKind) -> Vec<OutboxRecord> {
        let inner = self.inner.lock().unwrap();
        inner.table(kind).rows.values().cloned().collect()
    }

    /// 按业务身份取行（观测/断言用）
    pub fn get(&self, kind: RecordKind, topic: &str, identity: &str) -> Option<OutboxRecord> {
        let inner = self.inner.lock().unwrap();
        let table = inner.table(kind);
        let key = (topic.to_string(), identity.to_string());
        table
            .index
            .get(&key)
            .and_then(|seq| table.rows.get(seq))
            .cloned()
    }
}

enum Op {
    Insert(RecordKind, NewRecord),
    Delete(RecordKind, String, String),
}

/// 内存事务会话：写入暂存，提交时整体生效
pub struct InMemorySession {
    inner: Arc<Mutex<Inner>>,
    ops: Vec<Op>,
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn insert(&mut self, kind: RecordKind, record: NewRecord) -> OutboxResult<()> {
        // 立即校验唯一约束：对已提交行与本会话已暂存的插入同时生效
        let inner = self.inner.lock().unwrap();
        let committed_dup = inner.table(kind).contains(record.topic(), record.identity());
        drop(inner);

        let staged_dup = self.ops.iter().any(|op| match op {
            Op::Insert(k, r) => {
                *k == kind && r.topic() == record.topic() && r.identity() == record.identity()
            }
            Op::Delete(..) => false,
        });

        if committed_dup || staged_dup {
            return Err(OutboxError::DuplicateRecord {
                topic: record.topic().to_string(),
                identity: record.identity().to_string(),
            });
        }

        self.ops.push(Op::Insert(kind, record));
        Ok(())
    }

    async fn delete(&mut self, kind: RecordKind, topic: &str, identity: &str) -> OutboxResult<()> {
        self.ops
            .push(Op::Delete(kind, topic.to_string(), identity.to_string()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> OutboxResult<()> {
        let mut inner = self.inner.lock().unwrap();

        // 先整体校验再应用，保证提交的原子性（并发会话可能先行提交同键行）
        for op in &self.ops {
            if let Op::Insert(kind, record) = op {
                if inner.table(*kind).contains(record.topic(), record.identity()) {
                    return Err(OutboxError::DuplicateRecord {
                        topic: record.topic().to_string(),
                        identity: record.identity().to_string(),
                    });
                }
            }
        }

        let now = Utc::now();
        for op in self.ops {
            match op {
                Op::Insert(kind, record) => {
                    let sequence = inner.next_sequence();
                    inner.table_mut(kind).insert(sequence, &record, now);
                }
                Op::Delete(kind, topic, identity) => {
                    inner.table_mut(kind).delete(&topic, &identity);
                }
            }
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> OutboxResult<()> {
        // 暂存的变更随会话一起丢弃
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn begin(&self) -> OutboxResult<Box<dyn StoreSession>> {
        Ok(Box::new(InMemorySession {
            inner: self.inner.clone(),
            ops: Vec::new(),
        }))
    }

    async fn delete(&self, kind: RecordKind, topic: &str, identity: &str) -> OutboxResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.table_mut(kind).delete(topic, identity);
        Ok(())
    }

    async fn fetch_retryable(
        &self,
        kind: RecordKind,
        max_retries: i32,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> OutboxResult<Vec<OutboxRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .table(kind)
            .rows
            .values()
            .filter(|r| r.retries() < max_retries && r.created() < older_than)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn bump_retries(
        &self,
        kind: RecordKind,
        topic: &str,
        identity: &str,
    ) -> OutboxResult<i32> {
        let mut inner = self.inner.lock().unwrap();
        let table = inner.table_mut(kind);
        let key = (topic.to_string(), identity.to_string());
        let sequence = table.index.get(&key).copied();
        let Some(row) = sequence.and_then(|sequence| table.rows.get_mut(&sequence)) else {
            return Err(OutboxError::RecordNotFound {
                topic: topic.to_string(),
                identity: identity.to_string(),
            });
        };
        Ok(row.bump_retries(Utc::now()))
    }

    async fn count(&self, kind: RecordKind) -> OutboxResult<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.table(kind).rows.len() as u64)
    }
}
