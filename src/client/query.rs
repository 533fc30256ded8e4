use std::collections::BTreeMap;
use std::pin::Pin;

use async_stream::try_stream;
use futures::{Stream, TryStreamExt};
use tokio::sync::OwnedMutexGuard;

use super::{Channel, Session};
use crate::error::{ClientError, Result};
use crate::protocol::{encode_command, Command};

/// Stream of result items produced by [`Query::iter`].
pub type ResultStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Builds the `declare namespace` prologue, ordered by prefix.
pub fn namespace_prologue(namespaces: &BTreeMap<String, String>) -> String {
    namespaces
        .iter()
        .map(|(prefix, uri)| format!("declare namespace {} = \"{}\"; ", prefix, uri))
        .collect()
}

/// Server-side query, addressed by the id the server assigned at creation.
///
/// The id is only meaningful on the session that created it and becomes
/// invalid once the query or the session is closed.
#[derive(Debug)]
pub struct Query {
    session: Session,
    id: String,
    closed: bool,
}

impl Query {
    pub async fn new(session: &Session, text: &str) -> Result<Self> {
        let id = session
            .execute_code(Command::CreateQuery, &[text])
            .await
            .map_err(|e| match e {
                ClientError::Command { message, .. } => ClientError::QueryCreation(message),
                other => other,
            })?;
        tracing::debug!("Created query {}", id);

        Ok(Self {
            session: session.clone(),
            id,
            closed: false,
        })
    }

    /// Creates a query after prepending one namespace declaration per entry.
    pub async fn with_namespaces<I, K, V>(
        session: &Session,
        text: &str,
        namespaces: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let namespaces: BTreeMap<String, String> = namespaces
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let text = format!("{}{}", namespace_prologue(&namespaces), text);
        Self::new(session, &text).await
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.session.is_closed()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ClientError::UseAfterClose(format!(
                "query {} is closed",
                self.id
            )));
        }
        if self.session.is_closed() {
            return Err(ClientError::UseAfterClose(format!(
                "session of query {} is closed",
                self.id
            )));
        }
        Ok(())
    }

    async fn call(&self, cmd: Command, args: &[&str]) -> Result<String> {
        self.ensure_open()?;
        self.session.execute_code(cmd, args).await
    }

    /// Binds an untyped external variable.
    pub async fn bind(&self, name: &str, value: &str) -> Result<()> {
        self.bind_typed(name, value, "").await
    }

    /// Binds an external variable with an explicit type such as `xs:integer`.
    pub async fn bind_typed(&self, name: &str, value: &str, datatype: &str) -> Result<()> {
        self.call(Command::Bind, &[self.id.as_str(), name, value, datatype])
            .await
            .map(|_| ())
    }

    /// Sets the context item.
    pub async fn set_context(&self, value: &str) -> Result<()> {
        self.set_context_typed(value, "").await
    }

    pub async fn set_context_typed(&self, value: &str, datatype: &str) -> Result<()> {
        self.call(Command::Context, &[self.id.as_str(), value, datatype])
            .await
            .map(|_| ())
    }

    /// Runs the query and returns the whole serialized result.
    ///
    /// Item boundaries are lost; use [`Query::iter`] for multi-item results.
    pub async fn execute(&self) -> Result<String> {
        self.call(Command::Execute, &[self.id.as_str()]).await
    }

    /// Streams result items as the server delimits them.
    ///
    /// The stream holds the session lock until it is exhausted or dropped,
    /// so other commands on the same session wait for it. Dropping it between
    /// items is fine; the rest of the response is skipped by the next command.
    /// A failure reported after the last item is yielded as the final element.
    pub async fn iter(&self) -> Result<ResultStream> {
        self.ensure_open()?;
        let channel = self.session.channel_owned().await?;
        Ok(Box::pin(stream_items(channel, self.id.clone())))
    }

    /// Collects every item of [`Query::iter`].
    pub async fn results(&self) -> Result<Vec<String>> {
        self.iter().await?.try_collect().await
    }

    /// Compilation and evaluation info for the last run.
    pub async fn info(&self) -> Result<String> {
        self.call(Command::QueryInfo, &[self.id.as_str()]).await
    }

    /// Serialization options of the query.
    pub async fn options(&self) -> Result<String> {
        self.call(Command::QueryOptions, &[self.id.as_str()]).await
    }

    /// Releases the server-side query. Later calls fail without any I/O.
    pub async fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.session
            .execute_code(Command::CloseQuery, &[self.id.as_str()])
            .await?;
        tracing::debug!("Closed query {}", self.id);
        Ok(())
    }
}

fn stream_items(
    mut channel: OwnedMutexGuard<Channel>,
    id: String,
) -> impl Stream<Item = Result<String>> + Send {
    try_stream! {
        tracing::debug!("Sending {} for query {}", Command::Iterate, id);
        channel.send(&encode_command(Command::Iterate, &[id.as_str()])).await?;
        while let Some(item) = channel.next_item().await? {
            yield item;
        }
        channel.read_status().await?;
    }
}
