//! Database operations for the `proxies` table.

use sqlx::PgPool;

use crate::DbError;

/// A row from the `proxies` table.
#[derive(Clone, sqlx::FromRow)]
pub struct ProxyRow {
    pub id: i64,
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub http_port: i32,
    pub socks5_port: Option<i32>,
    pub is_active: bool,
}

impl ProxyRow {
    /// `http://[user:pass@]host:port`, suitable for an HTTP client proxy.
    #[must_use]
    pub fn http_url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!("http://{user}:{pass}@{}:{}", self.host, self.http_port)
            }
            _ => format!("http://{}:{}", self.host, self.http_port),
        }
    }

    /// `socks5://[user:pass@]host:port`, when the proxy offers SOCKS5.
    #[must_use]
    pub fn socks5_url(&self) -> Option<String> {
        let port = self.socks5_port?;
        Some(match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("socks5://{user}:{pass}@{}:{port}", self.host),
            _ => format!("socks5://{}:{port}", self.host),
        })
    }
}

impl std::fmt::Debug for ProxyRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRow")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("http_port", &self.http_port)
            .field("socks5_port", &self.socks5_port)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Returns all active proxies, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_proxies(pool: &PgPool) -> Result<Vec<ProxyRow>, DbError> {
    let rows = sqlx::query_as::<_, ProxyRow>(
        "SELECT id, host, username, password, http_port, socks5_port, is_active \
         FROM proxies \
         WHERE is_active = true \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(username: Option<&str>, password: Option<&str>, socks5_port: Option<i32>) -> ProxyRow {
        ProxyRow {
            id: 1,
            host: "10.0.0.1".to_string(),
            username: username.map(str::to_string),
            password: password.map(str::to_string),
            http_port: 8080,
            socks5_port,
            is_active: true,
        }
    }

    #[test]
    fn http_url_includes_credentials_when_present() {
        assert_eq!(
            proxy(Some("u"), Some("p"), None).http_url(),
            "http://u:p@10.0.0.1:8080"
        );
        assert_eq!(proxy(None, None, None).http_url(), "http://10.0.0.1:8080");
    }

    #[test]
    fn socks5_url_requires_port() {
        assert!(proxy(None, None, None).socks5_url().is_none());
        assert_eq!(
            proxy(Some("u"), Some("p"), Some(1080)).socks5_url().as_deref(),
            Some("socks5://u:p@10.0.0.1:1080")
        );
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", proxy(Some("u"), Some("secret"), None));
        assert!(!rendered.contains("secret"));
    }
}
