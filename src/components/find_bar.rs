use leptos::ev::KeyboardEvent;
use leptos::html::Input;
use leptos::prelude::*;

/// Search overlay shared by the editor and preview panes. Enter moves to
/// the next match, Shift+Enter to the previous one, Escape closes.
#[component]
pub fn FindBar(
    #[prop(into)] status: Signal<String>,
    #[prop(into)] on_query: Callback<String>,
    #[prop(into)] on_next: Callback<()>,
    #[prop(into)] on_previous: Callback<()>,
    #[prop(into)] on_close: Callback<()>,
) -> impl IntoView {
    let input_ref = NodeRef::<Input>::new();

    Effect::new(move |_| {
        if let Some(input) = input_ref.get() {
            let _ = input.focus();
        }
    });

    let on_keydown = move |ev: KeyboardEvent| match ev.key().as_str() {
        "Enter" => {
            ev.prevent_default();
            if ev.shift_key() {
                on_previous.run(());
            } else {
                on_next.run(());
            }
        }
        "Escape" => {
            ev.prevent_default();
            on_close.run(());
        }
        _ => {}
    };

    view! {
        <div class="find-bar">
            <input
                node_ref=input_ref
                type="search"
                placeholder="Find"
                on:input=move |ev| on_query.run(event_target_value(&ev))
                on:keydown=on_keydown
            />
            <span class="find-status">{move || status.get()}</span>
            <button title="Previous match" on:click=move |_| on_previous.run(())>"↑"</button>
            <button title="Next match" on:click=move |_| on_next.run(())>"↓"</button>
            <button title="Close" on:click=move |_| on_close.run(())>"×"</button>
        </div>
    }
}
