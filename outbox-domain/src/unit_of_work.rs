//! 单元工作（UnitOfWork）
//!
//! 一次请求/事务的显式作用域对象：持有事务会话与本单元暂存的事件
//! 缓冲区的归属权，随请求创建、随请求结束被消费或丢弃：
//! - `save` 在会话事务内落 Outbox 行并暂存事件；
//! - `commit` 先提交事务，成功后恰好冲刷一次暂存区；
//! - `rollback` 回滚事务并丢弃暂存区（零次冲刷）；
//! - 未显式收尾即被 Drop 时同样丢弃暂存区（会话由各实现自行回滚）。
//!
use crate::error::{OutboxError, OutboxResult};
use crate::event::RaisedEvents;
use crate::publisher::EventPublisher;
use crate::store::StoreSession;
use crate::writer::TransactionalWriter;
use std::sync::Arc;
use uuid::Uuid;

pub struct UnitOfWork {
    id: Uuid,
    session: Option<Box<dyn StoreSession>>,
    writer: TransactionalWriter,
    publisher: Arc<EventPublisher>,
}

impl UnitOfWork {
    pub fn new(
        session: Box<dyn StoreSession>,
        writer: TransactionalWriter,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session: Some(session),
            writer,
            publisher,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 在本单元的事务内保存聚合抛出/确认的事件
    pub async fn save(&mut self, events: &mut RaisedEvents) -> OutboxResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(OutboxError::UnitOfWorkFinished);
        };
        self.writer.save(session.as_mut(), events, self.id).await
    }

    /// 访问底层会话（在同一事务内执行业务写入时使用）
    pub fn session(&mut self) -> OutboxResult<&mut dyn StoreSession> {
        match self.session.as_mut() {
            Some(session) => Ok(session.as_mut()),
            None => Err(OutboxError::UnitOfWorkFinished),
        }
    }

    /// 提交事务；成功后冲刷暂存区（恰好一次），失败则丢弃
    pub async fn commit(mut self) -> OutboxResult<()> {
        let Some(session) = self.session.take() else {
            return Err(OutboxError::UnitOfWorkFinished);
        };

        match session.commit().await {
            Ok(()) => {
                self.publisher.flush_on_commit(self.id);
                Ok(())
            }
            Err(err) => {
                self.publisher.discard(self.id);
                Err(err)
            }
        }
    }

    /// 回滚事务并丢弃暂存区
    pub async fn rollback(mut self) -> OutboxResult<()> {
        let Some(session) = self.session.take() else {
            return Err(OutboxError::UnitOfWorkFinished);
        };

        let result = session.rollback().await;
        self.publisher.discard(self.id);
        result
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        // 未显式收尾：暂存区绝不冲刷
        if self.session.is_some() {
            self.publisher.discard(self.id);
        }
    }
}
