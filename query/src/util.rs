use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use leptos::*;

use crate::{Environment, Unsubscribe};

/// Runs `make_tick` inside an effect and (re)starts an interval with the tick it returns.
/// Whenever a signal read by `make_tick` changes, the previous interval is cleared first.
///
/// The returned handle stops the interval for good.
pub(crate) fn use_interval(
    environment: Rc<dyn Environment>,
    period: Duration,
    make_tick: impl Fn() -> Rc<dyn Fn()> + 'static,
) -> Unsubscribe {
    // Saves last interval to be cleared on restart and cleanup.
    let interval: Rc<RefCell<Option<Unsubscribe>>> = Rc::new(RefCell::new(None));
    let stopped = Rc::new(Cell::new(false));

    let clean_up = {
        let interval = interval.clone();
        let stopped = stopped.clone();
        move || {
            stopped.set(true);
            if let Some(clear) = interval.take() {
                clear();
            }
        }
    };

    create_isomorphic_effect({
        let interval = interval.clone();
        move |_| {
            if stopped.get() {
                return;
            }
            if let Some(clear) = interval.take() {
                clear();
            }
            let tick = make_tick();
            let handle = environment.set_interval(period, tick);
            interval.replace(Some(handle));
        }
    });

    let clean_up = Rc::new(Cell::new(Some(clean_up)));
    if Owner::current().is_some() {
        let clean_up = clean_up.clone();
        on_cleanup(move || {
            if let Some(clean_up) = clean_up.take() {
                clean_up();
            }
        });
    }

    Box::new(move || {
        if let Some(clean_up) = clean_up.take() {
            clean_up();
        }
    })
}

/// Writes `value` only when it differs, so ticking timers don't wake subscribers needlessly.
pub(crate) fn set_if_changed<T>(signal: RwSignal<T>, value: T)
where
    T: PartialEq + 'static,
{
    if signal
        .try_with_untracked(|current| *current != value)
        .unwrap_or(false)
    {
        signal.set(value);
    }
}
