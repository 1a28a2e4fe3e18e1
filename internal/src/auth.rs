use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{DirectoryError, Result};
use crate::pool::{open_session, SelectionStrategy};
use crate::session::DirectoryConnector;
use crate::DirectoryServer;

/// Checks end user credentials on dedicated sessions.
///
/// A bind changes the identity of the session it runs on, so user binds never
/// touch the service bound pool connections.
pub struct AuthValidator {
    connector: Arc<dyn DirectoryConnector>,
    strategy: Arc<dyn SelectionStrategy>,
    servers: Vec<DirectoryServer>,
}

impl AuthValidator {
    pub fn new(
        servers: Vec<DirectoryServer>,
        connector: Arc<dyn DirectoryConnector>,
        strategy: Arc<dyn SelectionStrategy>,
    ) -> Self {
        Self {
            connector,
            strategy,
            servers,
        }
    }

    /// Binds as `dn` and reports why it did not work
    pub async fn check(&self, dn: &str, password: &str) -> Result<()> {
        // an empty simple bind is an anonymous bind and would always succeed
        if password.is_empty() {
            return Err(DirectoryError::InvalidCredentials);
        }

        let (mut session, server) =
            open_session(self.connector.as_ref(), &self.servers, self.strategy.as_ref()).await?;

        let bound = session.bind(dn, password).await;
        if let Err(e) = session.unbind().await {
            debug!("Unbind of {dn} from {server} failed: {e}");
        }
        bound.map_err(DirectoryError::into_user_bind)?;

        debug!("{dn} authenticated against {server}");
        Ok(())
    }

    /// `true` only when the directory accepts the credentials
    pub async fn validate(&self, dn: &str, password: &str) -> bool {
        match self.check(dn, password).await {
            Ok(()) => true,
            Err(e) => {
                info!("Authentication of {dn} failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::RandomSelection;
    use crate::session::{MockDirectoryConnector, MockDirectorySession};

    fn validator(connector: MockDirectoryConnector) -> AuthValidator {
        AuthValidator::new(
            vec![DirectoryServer::new("ldap1", 389)],
            Arc::new(connector),
            Arc::new(RandomSelection),
        )
    }

    fn session(accepts: bool) -> MockDirectorySession {
        let mut session = MockDirectorySession::new();
        session.expect_bind().times(1).returning(move |dn, _| {
            if accepts {
                Ok(())
            } else {
                Err(DirectoryError::BindFailure {
                    dn: dn.to_string(),
                    rc: 49,
                    reason: "Invalid credentials".to_string(),
                })
            }
        });
        session.expect_unbind().times(1).returning(|| Ok(()));
        session
    }

    #[tokio::test]
    async fn accepts_valid_credentials() {
        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(|_| Ok(Box::new(session(true))));

        let validator = validator(connector);
        assert!(
            validator
                .validate("cn=jdoe,ou=people,dc=example,dc=com", "hunter2")
                .await
        );
    }

    #[tokio::test]
    async fn wrong_password_is_false() {
        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(|_| Ok(Box::new(session(false))));

        let validator = validator(connector);
        let dn = "cn=jdoe,ou=people,dc=example,dc=com";
        assert!(!validator.validate(dn, "wrong").await);
    }

    #[tokio::test]
    async fn rejected_binds_are_invalid_credentials() {
        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(|_| Ok(Box::new(session(false))));

        let result = validator(connector)
            .check("cn=jdoe,ou=people,dc=example,dc=com", "wrong")
            .await;
        assert!(matches!(result, Err(DirectoryError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn failed_unbind_keeps_the_bind_outcome() {
        let mut session = MockDirectorySession::new();
        session.expect_bind().times(1).returning(|dn, _| {
            Err(DirectoryError::BindFailure {
                dn: dn.to_string(),
                rc: 49,
                reason: "Invalid credentials".to_string(),
            })
        });
        session
            .expect_unbind()
            .times(1)
            .returning(|| Err(DirectoryError::Transport("connection reset".to_string())));

        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(|_| Ok(Box::new(session)));

        let result = validator(connector)
            .check("cn=jdoe,ou=people,dc=example,dc=com", "wrong")
            .await;
        assert!(matches!(result, Err(DirectoryError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn empty_password_never_binds() {
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().times(0);

        let validator = validator(connector);
        assert!(!validator.validate("cn=jdoe,dc=example,dc=com", "").await);
    }

    #[tokio::test]
    async fn unreachable_directory_is_false() {
        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .returning(|server| Err(DirectoryError::ConnectFailure(server.to_string())));

        let validator = validator(connector);
        assert!(!validator.validate("cn=jdoe,dc=example,dc=com", "hunter2").await);
    }
}
