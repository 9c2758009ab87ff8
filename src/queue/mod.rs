pub(crate) mod spsc;
pub(crate) mod steal;

pub(crate) use spsc::SpscQueue;
pub(crate) use steal::StealQueue;

/// Outcome of a thief-side steal attempt.
#[derive(Debug)]
pub(crate) enum Steal<T> {
    /// The queue was observed empty.
    Empty,
    /// Lost the race against the owner or another thief.
    Retry,
    Success(T),
}

impl<T> Steal<T> {
    pub(crate) fn success(self) -> Option<T> {
        match self {
            Steal::Success(value) => Some(value),
            _ => None,
        }
    }
}
