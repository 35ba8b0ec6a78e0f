mod unix_terminator;

#[cfg(unix)]
pub use unix_terminator::UnixTerminator;

#[cfg(unix)]
pub struct UnixTerminatorFactory;

#[cfg(unix)]
impl UnixTerminatorFactory {
    pub fn create_terminator() -> UnixTerminator {
        UnixTerminator::new()
    }

    pub fn platform_name() -> &'static str {
        "Unix"
    }
}
