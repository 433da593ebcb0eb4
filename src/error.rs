/// Turns a `Result` into an `Option`, logging the error instead of returning it.
///
/// This is how operations that must degrade rather than fail report what went
/// wrong: the error ends up in the log and the caller gets `None`.
pub trait ResultOkLogExt<T, E> {
    /// Logs the error at error level.
    fn ok_log(self) -> Option<T>;

    /// Logs the error at warn level.
    fn ok_warn(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }

    fn ok_warn(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        }
    }
}
