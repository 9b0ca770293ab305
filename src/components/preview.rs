use chrono::Duration;
use gloo_timers::callback::Timeout;
use leptos::html::Div;
use leptos::prelude::*;
use wasm_bindgen::prelude::*;
use web_sys::{Node, ScrollIntoViewOptions, ScrollLogicalPosition};

use super::find_bar::FindBar;
use super::toast::ToastQueue;
use super::Local;
use crate::export::{download, export_file_name, export_html};
use crate::clock::{millis_to_u32, BrowserClock, Clock};
use crate::find::{FindState, MatchRange, PendingQuery, PREVIEW_FIND_DELAY_MS};
use crate::markdown::render_markdown;
use crate::model::DEFAULT_TITLE;
use crate::notify::{Notifier, ToastLevel};
use crate::scroll_sync::Pane;

const SHOW_TEXT: u32 = 0x4;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = hljs, js_name = highlightElement)]
    fn highlight_element(element: &web_sys::Element) -> Result<(), JsValue>;
}

/// Runs highlight.js over every fenced code block under `root`. Missing or
/// failing highlight.js leaves the plain markup in place.
fn highlight_code_blocks(root: &web_sys::Element) {
    let Ok(blocks) = root.query_selector_all("pre code") else {
        return;
    };
    for i in 0..blocks.length() {
        let Some(element) = blocks.item(i).and_then(|node| node.dyn_into::<web_sys::Element>().ok())
        else {
            continue;
        };
        if highlight_element(&element).is_err() {
            log::debug!("highlight.js unavailable, code blocks left plain");
            return;
        }
    }
}

/// Selects the rendered text covering `range` of `root`'s text content and
/// scrolls it into view.
fn select_rendered(root: &web_sys::Element, text: &str, range: MatchRange) -> Result<(), JsValue> {
    let Some((start, end)) = range.to_utf16(text) else {
        return Ok(());
    };
    let document = window().document().ok_or_else(|| JsValue::from_str("no document"))?;
    let walker = document.create_tree_walker_with_what_to_show(root, SHOW_TEXT)?;
    let dom_range = document.create_range()?;

    let mut offset = 0u32;
    let mut start_node: Option<Node> = None;
    while let Some(node) = walker.next_node()? {
        let len = node.node_value().map(|v| v.encode_utf16().count() as u32).unwrap_or(0);
        if start_node.is_none() && start < offset + len {
            dom_range.set_start(&node, start - offset)?;
            start_node = Some(node.clone());
        }
        if start_node.is_some() && end <= offset + len {
            dom_range.set_end(&node, end - offset)?;
            break;
        }
        offset += len;
    }
    let Some(start_node) = start_node else {
        return Ok(());
    };

    if let Some(selection) = window().get_selection()? {
        selection.remove_all_ranges()?;
        selection.add_range(&dom_range)?;
    }
    if let Some(parent) = start_node.parent_element() {
        let options = ScrollIntoViewOptions::new();
        options.set_block(ScrollLogicalPosition::Center);
        parent.scroll_into_view_with_scroll_into_view_options(&options);
    }
    Ok(())
}

/// Runs `search` with the held query once it has been quiet long enough.
fn schedule_search(
    pending: Local<PendingQuery>,
    timer: Local<Option<Timeout>>,
    wait: Duration,
    search: Callback<String>,
) {
    let handle = Timeout::new(millis_to_u32(wait).max(1), move || {
        let now = BrowserClock.now();
        let polled = pending.try_update_value(|pending| (pending.poll(now), pending.remaining(now)));
        let Some((ready, left)) = polled else {
            return;
        };
        match (ready, left) {
            (Some(query), _) => search.run(query),
            (None, Some(left)) => schedule_search(pending, timer, left, search),
            (None, None) => {}
        }
    });
    timer.try_set_value(Some(handle));
}

fn rendered_text(preview_ref: NodeRef<Div>) -> Option<String> {
    preview_ref.get_untracked().map(|root| root.text_content().unwrap_or_default())
}

#[component]
pub fn PreviewPane(
    #[prop(into)] source: Signal<String>,
    #[prop(into)] title: Signal<Option<String>>,
    toasts: ToastQueue,
    preview_ref: NodeRef<Div>,
    #[prop(into)] on_scroll: Callback<Pane>,
) -> impl IntoView {
    let html = Memo::new(move |_| render_markdown(&source.get()));

    Effect::new(move |_| {
        html.track();
        request_animation_frame(move || {
            if let Some(root) = preview_ref.get_untracked() {
                highlight_code_blocks(&root);
            }
        });
    });

    let find = StoredValue::new_local(FindState::new());
    let find_open = RwSignal::new(false);
    let find_status = RwSignal::new(String::new());
    let pending: Local<PendingQuery> =
        StoredValue::new_local(PendingQuery::new(Duration::milliseconds(PREVIEW_FIND_DELAY_MS)));
    let find_timer: Local<Option<Timeout>> = StoredValue::new_local(None);
    on_cleanup(move || {
        find_timer.try_update_value(|timer| timer.take());
    });

    let show_match = move |found: Option<MatchRange>| {
        find_status.set(find.with_value(FindState::status));
        let (Some(range), Some(root)) = (found, preview_ref.get_untracked()) else {
            return;
        };
        let text = root.text_content().unwrap_or_default();
        if let Err(err) = select_rendered(&root, &text, range) {
            log::warn!("could not select preview match: {err:?}");
        }
    };

    let run_search = Callback::new(move |query: String| {
        let Some(text) = rendered_text(preview_ref) else {
            return;
        };
        find.update_value(|find| find.search(&text, &query));
        show_match(find.with_value(FindState::current_match));
    });
    let on_query = Callback::new(move |query: String| {
        let now = BrowserClock.now();
        if let Some(wait) = pending.try_update_value(|pending| pending.push(&query, now)) {
            schedule_search(pending, find_timer, wait, run_search);
        }
    });
    let on_next = Callback::new(move |_: ()| {
        let text = rendered_text(preview_ref).unwrap_or_default();
        let found = find.try_update_value(|find| find.next(&text)).flatten();
        show_match(found);
    });
    let on_previous = Callback::new(move |_: ()| {
        let text = rendered_text(preview_ref).unwrap_or_default();
        let found = find.try_update_value(|find| find.previous(&text)).flatten();
        show_match(found);
    });
    let on_close = Callback::new(move |_: ()| {
        find_timer.update_value(|timer| *timer = None);
        pending.update_value(PendingQuery::cancel);
        find.update_value(FindState::close);
        find_status.set(String::new());
        find_open.set(false);
        if let Ok(Some(selection)) = window().get_selection() {
            let _ = selection.remove_all_ranges();
        }
    });

    // Rendered text changes under an open search; recount once the new
    // markup is in the DOM.
    Effect::new(move |_| {
        html.track();
        if !find_open.get_untracked() {
            return;
        }
        request_animation_frame(move || {
            if let Some(text) = rendered_text(preview_ref) {
                find.try_update_value(|find| find.refresh(&text));
                if let Some(status) = find.try_with_value(FindState::status) {
                    find_status.try_set(status);
                }
            }
        });
    });

    let export = move |_| {
        let title = title.get_untracked().unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let page = export_html(&title, &html.get_untracked());
        match download(&export_file_name(&title), "text/html", &page) {
            Ok(()) => log::info!("exported {title}"),
            Err(err) => {
                log::error!("export failed: {err:?}");
                toasts.notify(ToastLevel::Error, "Could not export document".to_string());
            }
        }
    };

    let on_keydown = move |ev: leptos::ev::KeyboardEvent| {
        if (ev.ctrl_key() || ev.meta_key()) && ev.key().eq_ignore_ascii_case("f") {
            ev.prevent_default();
            find_open.set(true);
        }
    };

    view! {
        <section class="preview-pane" tabindex="-1" on:keydown=on_keydown>
            <header class="pane-header">
                <span class="pane-title">"Preview"</span>
                <button title="Find in preview" on:click=move |_| find_open.set(true)>"Find"</button>
                <button title="Download as HTML" on:click=export>"Export HTML"</button>
            </header>
            <Show when=move || find_open.get()>
                <FindBar
                    status=Signal::derive(move || find_status.get())
                    on_query=on_query
                    on_next=on_next
                    on_previous=on_previous
                    on_close=on_close
                />
            </Show>
            <div
                class="preview-content markdown-body"
                node_ref=preview_ref
                inner_html=move || html.get()
                on:scroll=move |_| on_scroll.run(Pane::Preview)
            ></div>
        </section>
    }
}
