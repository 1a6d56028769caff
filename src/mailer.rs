use async_trait::async_trait;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_confirmation(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

/// Writes outgoing mail to the log instead of a mail server.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_confirmation(&self, email: &str, code: &str) -> anyhow::Result<()> {
        tracing::info!(to = %email, code = %code, "confirmation code issued");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every sent message so tests can read codes back.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingMailer {
        pub fn last_code(&self, email: &str) -> Option<String> {
            let sent = self.sent.lock().unwrap();
            sent.iter().rev().find(|(to, _)| to == email).map(|(_, code)| code.clone())
        }

        pub fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_confirmation(&self, email: &str, code: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push((email.to_string(), code.to_string()));
            Ok(())
        }
    }
}
