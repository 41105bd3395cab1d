//! Cached account repository decorator.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use mapro_core::cache::WriteKind;
use mapro_core::registry::{Account, Role};
use mapro_core::storage::{AccountRepository, Result};

use crate::cache::InvalidationCoordinator;

/// Account repository decorator that invalidates per-account access data.
pub struct CachedAccountRepository<R>
where
    R: AccountRepository,
{
    repository: Arc<R>,
    coordinator: InvalidationCoordinator,
}

impl<R> CachedAccountRepository<R>
where
    R: AccountRepository,
{
    pub fn new(repository: Arc<R>, coordinator: InvalidationCoordinator) -> Self {
        Self {
            repository,
            coordinator,
        }
    }

    async fn committed(&self, account_id: Uuid) {
        if let Err(err) = self
            .coordinator
            .on_write(WriteKind::AccountChange, &[account_id])
            .await
        {
            tracing::error!(
                %account_id,
                error = %err,
                "Cache invalidation failed after account change"
            );
        }
        tracing::debug!(%account_id, "Account written");
    }
}

#[async_trait]
impl<R> AccountRepository for CachedAccountRepository<R>
where
    R: AccountRepository + 'static,
{
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        self.repository.get_account(id).await
    }

    async fn create_account(&self, account: &Account) -> Result<()> {
        self.repository.create_account(account).await?;
        self.committed(account.id).await;
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Account> {
        let account = self.repository.set_role(id, role).await?;
        self.committed(id).await;
        Ok(account)
    }
}
