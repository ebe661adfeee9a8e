use std::future::poll_fn;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_postgres::{AsyncMessage, NoTls};
use tracing::debug;

use super::{DriverEvent, ResourceFactory};
use crate::config::ConnectionSettings;
use crate::error::PgSteadyError;

/// An owned, dedicated database session.
///
/// Holds the client plus the task driving its connection. The driver task is
/// what observes inbound notifications and the terminal error/end of the
/// socket.
pub struct PgSession {
    client: Arc<tokio_postgres::Client>,
    driver: JoinHandle<()>,
}

/// Factory for the single-connection shape: one session, `acquire` hands out
/// the same handle every time. This is the only shape on which `LISTEN`
/// subscriptions are meaningful, since notifications require a dedicated
/// session.
pub struct SessionFactory {
    settings: ConnectionSettings,
}

impl SessionFactory {
    #[must_use]
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ResourceFactory for SessionFactory {
    type Resource = PgSession;
    type Handle = Arc<tokio_postgres::Client>;

    async fn create(
        &self,
        events: mpsc::UnboundedSender<DriverEvent>,
    ) -> Result<PgSession, PgSteadyError> {
        let (client, mut connection) = self.settings.pg_config().connect(NoTls).await?;

        let driver = tokio::spawn(async move {
            loop {
                match poll_fn(|cx| connection.poll_message(cx)).await {
                    Some(Ok(AsyncMessage::Notification(n))) => {
                        let _ = events.send(DriverEvent::Notification {
                            channel: n.channel().to_string(),
                            payload: n.payload().to_string(),
                        });
                    }
                    Some(Ok(_)) => {
                        // Notices and other async chatter are not interesting.
                    }
                    Some(Err(error)) => {
                        let _ = events.send(DriverEvent::Error(error.to_string()));
                        break;
                    }
                    None => {
                        let _ = events.send(DriverEvent::Closed);
                        break;
                    }
                }
            }
        });

        Ok(PgSession {
            client: Arc::new(client),
            driver,
        })
    }

    async fn acquire(
        &self,
        resource: &PgSession,
    ) -> Result<Arc<tokio_postgres::Client>, PgSteadyError> {
        Ok(resource.client.clone())
    }

    async fn destroy(&self, resource: PgSession) -> Result<(), PgSteadyError> {
        // Dropping the client closes the socket once in-flight handles are
        // gone; aborting the driver task stops further event flow from this
        // (now intentionally dead) session.
        debug!("destroying dedicated session");
        drop(resource.client);
        resource.driver.abort();
        Ok(())
    }
}
