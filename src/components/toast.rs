use gloo_timers::callback::Timeout;
use leptos::prelude::*;

use crate::notify::{Notifier, ToastLevel};

const TOAST_LIFETIME_MS: u32 = 4_000;

#[derive(Clone, Debug, PartialEq)]
pub struct Toast {
    id: u64,
    level: ToastLevel,
    message: String,
}

/// Notification stack rendered in the corner of the app. Each toast
/// removes itself after a few seconds.
#[derive(Clone, Copy)]
pub struct ToastQueue {
    toasts: RwSignal<Vec<Toast>>,
    next_id: StoredValue<u64>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self {
            toasts: RwSignal::new(Vec::new()),
            next_id: StoredValue::new(0),
        }
    }

    pub fn dismiss(&self, id: u64) {
        self.toasts.try_update(|toasts| toasts.retain(|toast| toast.id != id));
    }
}

impl Notifier for ToastQueue {
    fn notify(&self, level: ToastLevel, message: String) {
        let Some(id) = self.next_id.try_update_value(|next| {
            *next += 1;
            *next
        }) else {
            return;
        };
        self.toasts
            .try_update(|toasts| toasts.push(Toast { id, level, message }));
        let queue = *self;
        Timeout::new(TOAST_LIFETIME_MS, move || queue.dismiss(id)).forget();
    }
}

#[component]
pub fn ToastStack(queue: ToastQueue) -> impl IntoView {
    view! {
        <div class="toast-stack" role="status" aria-live="polite">
            {move || queue.toasts.get().into_iter().map(|toast| {
                let id = toast.id;
                view! {
                    <div class=toast.level.class() on:click=move |_| queue.dismiss(id)>
                        {toast.message}
                    </div>
                }
            }).collect::<Vec<_>>()}
        </div>
    }
}
