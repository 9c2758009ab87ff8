use super::{Future, Promise};
use crate::runtime::global;
use crate::task::Task;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// First-wins fan-in over a heterogeneous pack of futures.
///
/// The returned future carries a tagged union over the inputs' value types
/// (`AnyOf2`, `AnyOf3`, …); the variant index is the pack position of the
/// first input to complete. The winner fulfills the output whether it
/// succeeded or failed; every later completion is discarded.
pub fn when_any<S: Select>(futures: S) -> Future<S::Output> {
    futures.select()
}

/// Implemented for tuples of futures of arity 1 through 8.
pub trait Select {
    type Output: Send + 'static;

    fn select(self) -> Future<Self::Output>;
}

macro_rules! impl_select {
    ($Any:ident => $(($T:ident, $Variant:ident, $idx:tt)),+) => {
        /// Tagged union over the value types of a `when_any` pack.
        #[derive(Debug, Clone, PartialEq)]
        pub enum $Any<$($T),+> {
            $($Variant($T),)+
        }

        impl<$($T),+> Select for ($(Future<$T>,)+)
        where
            $($T: Clone + Send + 'static),+
        {
            type Output = $Any<$($T),+>;

            fn select(self) -> Future<Self::Output> {
                let promise = Promise::new();
                let out = promise.get_future();

                let claimed = Arc::new(AtomicBool::new(false));
                let promise = Arc::new(Mutex::new(Some(promise)));

                $(
                    {
                        let claimed = Arc::clone(&claimed);
                        let promise = Arc::clone(&promise);
                        let upstream = Arc::clone(self.$idx.state());
                        let cont = Task::new(move || {
                            // The compare-and-swap elects a unique winner;
                            // losers return without touching the output.
                            if claimed
                                .compare_exchange(
                                    false,
                                    true,
                                    Ordering::AcqRel,
                                    Ordering::Acquire,
                                )
                                .is_ok()
                            {
                                let promise = promise
                                    .lock()
                                    .take()
                                    .expect("when_any winner found no promise");
                                match upstream.peek() {
                                    Ok(value) => promise.set_value($Any::$Variant(value)),
                                    Err(error) => promise.set_error(error),
                                }
                            }
                        });
                        if let Some(cont) = self.$idx.state().register(cont) {
                            global::submit_or_inline(cont);
                        }
                    }
                )+

                out
            }
        }
    };
}

impl_select!(AnyOf1 => (V1, First, 0));
impl_select!(AnyOf2 => (V1, First, 0), (V2, Second, 1));
impl_select!(AnyOf3 => (V1, First, 0), (V2, Second, 1), (V3, Third, 2));
impl_select!(AnyOf4 => (V1, First, 0), (V2, Second, 1), (V3, Third, 2), (V4, Fourth, 3));
impl_select!(AnyOf5 => (V1, First, 0), (V2, Second, 1), (V3, Third, 2), (V4, Fourth, 3), (V5, Fifth, 4));
impl_select!(AnyOf6 => (V1, First, 0), (V2, Second, 1), (V3, Third, 2), (V4, Fourth, 3), (V5, Fifth, 4), (V6, Sixth, 5));
impl_select!(AnyOf7 => (V1, First, 0), (V2, Second, 1), (V3, Third, 2), (V4, Fourth, 3), (V5, Fifth, 4), (V6, Sixth, 5), (V7, Seventh, 6));
impl_select!(AnyOf8 => (V1, First, 0), (V2, Second, 1), (V3, Third, 2), (V4, Fourth, 3), (V5, Fifth, 4), (V6, Sixth, 5), (V7, Seventh, 6), (V8, Eighth, 7));
