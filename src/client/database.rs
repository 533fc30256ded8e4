use super::Session;
use crate::error::Result;
use crate::protocol::Command;

impl Session {
    /// Creates database `name`, optionally seeded with an initial document.
    pub async fn create(&self, name: &str, content: &str) -> Result<()> {
        self.send_input(Command::CreateDatabase, name, content).await
    }

    /// Adds a document under `path` to the opened database.
    pub async fn add(&self, path: &str, content: &str) -> Result<()> {
        self.send_input(Command::AddDocument, path, content).await
    }

    /// Replaces the document at `path`, or adds it if missing.
    pub async fn replace(&self, path: &str, content: &str) -> Result<()> {
        self.send_input(Command::ReplaceDocument, path, content).await
    }

    /// Stores a raw resource at `path`.
    pub async fn store(&self, path: &str, content: &str) -> Result<()> {
        self.send_input(Command::StoreBinary, path, content).await
    }

    async fn send_input(&self, cmd: Command, name: &str, content: &str) -> Result<()> {
        self.channel().await?.send_input(cmd, name, content).await
    }
}
