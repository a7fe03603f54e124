//! Async effects handed to the host runtime.
//!
//! Lifecycle hooks such as [`Coordinator::mount`] do not await their work.
//! They return a [`Command`]: a lazily consumed stream of messages that the
//! host runtime drives and feeds back into its own update loop.
//!
//! [`Coordinator::mount`]: crate::coordinator::Coordinator::mount

use futures::{
    FutureExt, StreamExt,
    stream::{self, BoxStream, select_all},
};

/// A set of asynchronous operations producing messages.
///
/// # Examples
///
/// ```
/// use tether::command::Command;
///
/// enum Message {
///     Loaded(i32),
/// }
///
/// let cmd = Command::perform(async { 42 }, Message::Loaded);
/// assert!(!cmd.is_none());
/// ```
pub struct Command<Msg: Send + 'static> {
    pub(crate) stream: Option<BoxStream<'static, Msg>>,
}

impl<Msg: Send + 'static> Command<Msg> {
    /// A command that does nothing.
    ///
    /// ```
    /// use tether::command::Command;
    ///
    /// let cmd: Command<i32> = Command::none();
    /// assert!(cmd.is_none());
    /// ```
    #[must_use]
    pub fn none() -> Self {
        Self { stream: None }
    }

    /// Runs `future` and converts its output with `f`.
    pub fn perform<A>(
        future: impl Future<Output = A> + Send + 'static,
        f: impl FnOnce(A) -> Msg + Send + 'static,
    ) -> Self {
        Self::future(future.map(f))
    }

    /// Runs a future that produces a message directly.
    pub fn future(future: impl Future<Output = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(future.into_stream().boxed()),
        }
    }

    /// Combines commands; they run concurrently and their messages interleave.
    ///
    /// `Command::none()` entries are dropped.
    ///
    /// ```
    /// use tether::command::Command;
    ///
    /// let cmd = Command::batch(vec![
    ///     Command::future(async { 1 }),
    ///     Command::none(),
    ///     Command::future(async { 2 }),
    /// ]);
    /// assert!(!cmd.is_none());
    /// ```
    pub fn batch(commands: impl IntoIterator<Item = Self>) -> Self {
        let streams: Vec<_> = commands.into_iter().filter_map(|cmd| cmd.stream).collect();

        if streams.is_empty() {
            Self::none()
        } else {
            Self {
                stream: Some(select_all(streams).boxed()),
            }
        }
    }

    /// Converts every message with `f`.
    ///
    /// This is how a host runtime lifts library commands into its own
    /// message type.
    pub fn map<B: Send + 'static>(self, f: impl Fn(Msg) -> B + Send + 'static) -> Command<B> {
        Command {
            stream: self.stream.map(|s| s.map(f).boxed()),
        }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.stream.is_none()
    }

    /// Consumes the command into its message stream.
    ///
    /// `Command::none()` yields an empty stream.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, Msg> {
        self.stream.unwrap_or_else(|| stream::empty().boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect<Msg: Send + 'static>(cmd: Command<Msg>) -> Vec<Msg> {
        cmd.into_stream().collect().await
    }

    #[tokio::test]
    async fn test_batch_empty() {
        let cmd: Command<i32> = Command::batch(vec![]);
        assert!(cmd.is_none());
    }

    #[tokio::test]
    async fn test_batch_single_command() {
        let cmd = Command::batch(vec![Command::future(async { 1 })]);
        assert_eq!(collect(cmd).await, vec![1]);
    }

    #[tokio::test]
    async fn test_batch_multiple_commands() {
        let cmd = Command::batch(vec![
            Command::future(async { 1 }),
            Command::future(async { 2 }),
            Command::future(async { 3 }),
        ]);

        // Order may vary due to concurrent execution
        let mut results = collect(cmd).await;
        results.sort_unstable();
        assert_eq!(results, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_batch_with_none_commands() {
        let cmd = Command::batch(vec![
            Command::future(async { 1 }),
            Command::<i32>::none(),
            Command::future(async { 3 }),
        ]);

        let mut results = collect(cmd).await;
        results.sort_unstable();
        assert_eq!(results, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_batch_all_none() {
        let cmd = Command::batch(vec![Command::<i32>::none(), Command::<i32>::none()]);
        assert!(cmd.is_none());
    }

    #[tokio::test]
    async fn test_none_into_stream_is_empty() {
        assert!(collect(Command::<i32>::none()).await.is_empty());
    }

    #[tokio::test]
    async fn test_perform_and_map() {
        #[derive(Debug, PartialEq)]
        enum Message {
            Loaded(String),
        }

        let cmd = Command::perform(async { 21 }, |n| n * 2).map(|n: i32| Message::Loaded(n.to_string()));
        assert_eq!(collect(cmd).await, vec![Message::Loaded("42".to_string())]);

        let none: Command<Message> = Command::<i32>::none().map(|n| Message::Loaded(n.to_string()));
        assert!(none.is_none());
    }
}
