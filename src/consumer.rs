use futures::{Stream, StreamExt};
use tracing::debug;

use crate::{
    error::{Error, Result},
    schema::AuthProgress,
    session::TokenSession,
};

/// Drain an authentication stream into a [`TokenSession`].
///
/// `on_progress` sees every message as soon as it arrives. The session is
/// built from the last message, which must be [`AuthProgress::Issued`] with a
/// non-empty access token. Stream errors are returned as they are.
pub async fn consume<S, F>(stream: S, mut on_progress: F) -> Result<TokenSession>
where
    S: Stream<Item = Result<AuthProgress>>,
    F: FnMut(&AuthProgress),
{
    futures::pin_mut!(stream);

    let mut last: Option<AuthProgress> = None;
    let mut received = 0usize;

    while let Some(item) = stream.next().await {
        let message = item?;
        received += 1;

        if last.as_ref().is_some_and(AuthProgress::is_terminal) {
            return Err(Error::ProtocolViolation(format!(
                "message {received} arrived after tokens were issued"
            )));
        }

        on_progress(&message);
        last = Some(message);
    }

    debug!("Authentication stream closed after {} messages", received);

    match last {
        None => Err(Error::ProtocolViolation(
            "authentication stream closed without any message".to_string(),
        )),
        Some(AuthProgress::Progress { message }) => Err(Error::ProtocolViolation(format!(
            "authentication stream closed before tokens were issued (last message: {message:?})"
        ))),
        Some(AuthProgress::Issued {
            access_token,
            refresh_token,
            ..
        }) => {
            if access_token.is_empty() {
                return Err(Error::ProtocolViolation(
                    "terminal message carries an empty access token".to_string(),
                ));
            }
            Ok(TokenSession::new(access_token, refresh_token))
        }
    }
}
