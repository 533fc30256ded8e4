use super::Session;
use crate::config::Config;
use crate::error::Result;

pub struct SessionBuilder {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: Option<String>,
}

impl SessionBuilder {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            user: Config::DEFAULT_USER.to_string(),
            password: Config::DEFAULT_PASSWORD.to_string(),
            database: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let builder = Self::new(&config.host, config.port).auth(&config.user, &config.password);
        match &config.database {
            Some(database) => builder.database(database),
            None => builder,
        }
    }

    pub fn auth(mut self, user: &str, password: &str) -> Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    /// Database to open once authenticated.
    pub fn database(mut self, name: &str) -> Self {
        self.database = Some(name.to_string());
        self
    }

    pub async fn build(self) -> Result<Session> {
        Session::connect(
            &self.host,
            self.port,
            &self.user,
            &self.password,
            self.database.as_deref(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = SessionBuilder::new("localhost", 1984);
        assert_eq!(builder.host, "localhost");
        assert_eq!(builder.port, 1984);
        assert_eq!(builder.user, "admin");
        assert_eq!(builder.password, "admin");
        assert!(builder.database.is_none());
    }

    #[test]
    fn test_builder_chained() {
        let builder = SessionBuilder::new("10.0.0.5", 8984)
            .auth("reader", "secret123")
            .database("RePEc");
        assert_eq!(builder.user, "reader");
        assert_eq!(builder.password, "secret123");
        assert_eq!(builder.database.as_deref(), Some("RePEc"));
    }

    #[test]
    fn test_builder_from_config() {
        let config = Config {
            host: "db.internal".to_string(),
            port: 2000,
            user: "etl".to_string(),
            password: "pw".to_string(),
            database: Some("factbook".to_string()),
        };
        let builder = SessionBuilder::from_config(&config);
        assert_eq!(builder.host, "db.internal");
        assert_eq!(builder.port, 2000);
        assert_eq!(builder.user, "etl");
        assert_eq!(builder.database.as_deref(), Some("factbook"));
    }
}
