use std::{rc::Rc, time::Duration};

use leptos::*;

use crate::{
    binding::Binding,
    util::{set_if_changed, use_interval},
    Instant, QueryValue,
};

/// Whether a focus refetch is allowed at `now`, and how long until it is.
pub(crate) fn focus_availability(
    last_focus: Instant,
    focus_interval: Duration,
    now: Instant,
) -> (bool, Duration) {
    let elapsed = now - last_focus;
    (
        elapsed > focus_interval,
        focus_interval.saturating_sub(elapsed),
    )
}

/// Whether a key expiring at `expires_at` is stale at `now`, and how long until it is.
/// Unknown expiration counts as stale.
pub(crate) fn staleness(expires_at: Option<Instant>, now: Instant) -> (bool, Duration) {
    match expires_at {
        Some(expires_at) => (expires_at < now, expires_at.remaining_from(now)),
        None => (true, Duration::ZERO),
    }
}

pub(crate) fn create_focus_available<V>(
    binding: &Rc<Binding<V>>,
    precision: Duration,
) -> (Signal<bool>, Signal<Duration>)
where
    V: QueryValue,
{
    let environment = binding.options.environment.clone();
    let focus_interval = binding.options.focus_interval;
    let last_focus = binding.last_focus;

    let (available, available_in) = focus_availability(
        last_focus.get_untracked(),
        focus_interval,
        environment.now(),
    );
    let is_available = RwSignal::new(available);
    let available_in = RwSignal::new(available_in);

    let tick: Rc<dyn Fn()> = {
        let environment = environment.clone();
        Rc::new(move || {
            let Some(last) = last_focus.try_get_untracked() else {
                return;
            };
            let (available, remaining) =
                focus_availability(last, focus_interval, environment.now());
            set_if_changed(is_available, available);
            set_if_changed(available_in, remaining);
        })
    };

    binding.register_timer(environment.set_interval(precision, tick));

    (is_available.read_only().into(), available_in.read_only().into())
}

pub(crate) fn create_stale<V>(
    binding: &Rc<Binding<V>>,
    precision: Duration,
) -> (Signal<bool>, Signal<Duration>)
where
    V: QueryValue,
{
    let environment = binding.options.environment.clone();
    let key = binding.key;

    let expiration = {
        let engine = binding.engine().clone();
        move |key: Option<&str>| key.and_then(|key| engine.expiration(key))
    };

    let (stale, stale_in) = staleness(
        expiration(binding.current_key().as_deref()),
        environment.now(),
    );
    let is_stale = RwSignal::new(stale);
    let stale_in = RwSignal::new(stale_in);

    let stop = use_interval(environment.clone(), precision, move || {
        // Tracked, so the interval restarts on every key change.
        let key = key.get();
        let expiration = expiration.clone();
        let environment = environment.clone();
        let tick = move || {
            let (stale, remaining) = staleness(expiration(key.as_deref()), environment.now());
            set_if_changed(is_stale, stale);
            set_if_changed(stale_in, remaining);
        };
        tick();
        Rc::new(tick) as Rc<dyn Fn()>
    });

    binding.register_timer(stop);

    (is_stale.read_only().into(), stale_in.read_only().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_availability_window() {
        let focus = Instant::from_millis(10_000);
        let interval = Duration::from_millis(5000);

        assert_eq!(
            focus_availability(focus, interval, focus),
            (false, Duration::from_millis(5000))
        );
        assert_eq!(
            focus_availability(focus, interval, focus + Duration::from_millis(2000)),
            (false, Duration::from_millis(3000))
        );
        assert_eq!(
            focus_availability(focus, interval, focus + Duration::from_millis(5000)),
            (false, Duration::ZERO),
            "available only once strictly past the interval"
        );
        assert_eq!(
            focus_availability(focus, interval, focus + Duration::from_millis(5001)),
            (true, Duration::ZERO)
        );
    }

    #[test]
    fn staleness_window() {
        let now = Instant::from_millis(10_000);

        assert_eq!(staleness(None, now), (true, Duration::ZERO));
        assert_eq!(
            staleness(Some(now + Duration::from_millis(1000)), now),
            (false, Duration::from_millis(1000))
        );
        assert_eq!(
            staleness(Some(now), now + Duration::from_millis(1)),
            (true, Duration::ZERO)
        );
    }
}
