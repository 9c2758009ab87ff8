use super::{Future, Promise};
use crate::runtime::global;
use crate::task::Task;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fan-in over a heterogeneous pack of futures.
///
/// The returned future carries a tuple of every input's value, in pack
/// order; inputs of `Future<()>` contribute `()` to their slot. The pack
/// fails fast: the first observed input failure becomes the output failure
/// and later completions are discarded.
///
/// The empty pack `when_all(())` is ready immediately with the empty tuple.
pub fn when_all<J: Join>(futures: J) -> Future<J::Output> {
    futures.join()
}

/// Implemented for tuples of futures up to arity 8.
pub trait Join {
    type Output: Send + 'static;

    fn join(self) -> Future<Self::Output>;
}

impl Join for () {
    type Output = ();

    fn join(self) -> Future<()> {
        let promise = Promise::new();
        let out = promise.get_future();
        promise.set_value(());
        out
    }
}

macro_rules! impl_join {
    ($n:expr => $(($T:ident, $idx:tt)),+) => {
        impl<$($T),+> Join for ($(Future<$T>,)+)
        where
            $($T: Clone + Send + 'static),+
        {
            type Output = ($($T,)+);

            fn join(self) -> Future<Self::Output> {
                struct State<$($T),+> {
                    slots: Mutex<($(Option<$T>,)+)>,
                    remaining: AtomicUsize,
                    promise: Mutex<Option<Promise<($($T,)+)>>>,
                }

                let promise = Promise::new();
                let out = promise.get_future();
                let state = Arc::new(State::<$($T),+> {
                    slots: Mutex::new(Default::default()),
                    remaining: AtomicUsize::new($n),
                    promise: Mutex::new(Some(promise)),
                });

                // Assembles and publishes the tuple; called by whichever
                // continuation observes the final counter decrement.
                let complete = {
                    let state = Arc::clone(&state);
                    move || {
                        if let Some(promise) = state.promise.lock().take() {
                            let tuple = {
                                let mut slots = state.slots.lock();
                                ($(slots.$idx.take().expect("when_all slot unfilled"),)+)
                            };
                            promise.set_value(tuple);
                        }
                    }
                };

                $(
                    {
                        let state = Arc::clone(&state);
                        let complete = complete.clone();
                        let upstream = Arc::clone(self.$idx.state());
                        let cont = Task::new(move || match upstream.peek() {
                            Ok(value) => {
                                state.slots.lock().$idx = Some(value);
                                // The 1 -> 0 transition is the unique
                                // success-path publication event.
                                if state.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                                    complete();
                                }
                            }
                            // Fail fast: the first failure claims the
                            // promise; everything after finds it taken.
                            Err(error) => {
                                if let Some(promise) = state.promise.lock().take() {
                                    promise.set_error(error);
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

impl_join!(1 => (V1, 0));
impl_join!(2 => (V1, 0), (V2, 1));
impl_join!(3 => (V1, 0), (V2, 1), (V3, 2));
impl_join!(4 => (V1, 0), (V2, 1), (V3, 2), (V4, 3));
impl_join!(5 => (V1, 0), (V2, 1), (V3, 2), (V4, 3), (V5, 4));
impl_join!(6 => (V1, 0), (V2, 1), (V3, 2), (V4, 3), (V5, 4), (V6, 5));
impl_join!(7 => (V1, 0), (V2, 1), (V3, 2), (V4, 3), (V5, 4), (V6, 5), (V7, 6));
impl_join!(8 => (V1, 0), (V2, 1), (V3, 2), (V4, 3), (V5, 4), (V6, 5), (V7, 6), (V8, 7));
