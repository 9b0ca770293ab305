use chrono::Duration;
use gloo_timers::callback::Timeout;
use leptos::ev::KeyboardEvent;
use leptos::html::Textarea;
use leptos::prelude::*;
use leptos::task::spawn_local;
use uuid::Uuid;

use super::find_bar::FindBar;
use super::toast::ToastQueue;
use super::Local;
use crate::autosave::{Autosave, AutosaveStatus, AUTOSAVE_DELAY_MS};
use crate::clock::{millis_to_u32, BrowserClock, Clock};
use crate::find::{FindState, MatchRange};
use crate::markdown::{highlight_markdown, text_stats};
use crate::model::{parse_tag_list, Document, DocumentPatch};
use crate::notify::{Notifier, ToastLevel};
use crate::scroll_sync::Pane;
use crate::store::DocumentStore;

/// The editing buffer of the pane and everything that writes it back.
#[derive(Clone, Copy)]
struct Buffer {
    docs: Local<DocumentStore>,
    autosave: Local<Autosave>,
    timer: Local<Option<Timeout>>,
    editing: Local<Option<Uuid>>,
    status: RwSignal<AutosaveStatus>,
    draft: RwSignal<String>,
}

impl Buffer {
    fn refresh_status(self) {
        if let Some(status) = self.autosave.try_with_value(Autosave::status) {
            self.status.try_set(status);
        }
    }

    fn schedule(self, delay_ms: u32) {
        let timer = Timeout::new(delay_ms, move || self.fire());
        self.timer.try_set_value(Some(timer));
    }

    fn cancel_timer(self) {
        self.timer.try_update_value(|timer| timer.take());
    }

    fn fire(self) {
        let now = BrowserClock.now();
        let Some((previous, written, remaining)) = self.autosave.try_update_value(|autosave| {
            let previous = autosave.synced().to_string();
            let written = autosave.poll(now);
            (previous, written, autosave.remaining(now))
        }) else {
            return;
        };
        match (written, remaining) {
            (Some(text), _) => self.write(DocumentPatch::content(text), previous, None),
            (None, Some(left)) => self.schedule(millis_to_u32(left).max(1)),
            (None, None) => {}
        }
        self.refresh_status();
    }

    fn edit(self, text: String) {
        self.draft.set(text.clone());
        let enabled = self
            .docs
            .try_with_value(|docs| docs.preferences().autosave)
            .unwrap_or(false);
        let now = BrowserClock.now();
        let scheduled = self
            .autosave
            .try_update_value(|autosave| autosave.edit(text, now, enabled))
            .flatten();
        match scheduled {
            Some(_) => self.schedule(millis_to_u32(Duration::milliseconds(AUTOSAVE_DELAY_MS))),
            None => self.cancel_timer(),
        }
        self.refresh_status();
    }

    /// Writes the buffer right away, optionally with header fields.
    fn commit(self, title: Option<String>, tags: Option<Vec<String>>, confirm: Option<ToastQueue>) {
        self.cancel_timer();
        let Some((previous, text)) = self.autosave.try_update_value(|autosave| {
            let previous = autosave.synced().to_string();
            (previous, autosave.save_now())
        }) else {
            return;
        };
        let mut patch = DocumentPatch::content(text);
        if let Some(title) = title {
            patch = patch.with_title(title);
        }
        if let Some(tags) = tags {
            patch = patch.with_tags(tags);
        }
        self.write(patch, previous, confirm);
        self.refresh_status();
    }

    fn flush(self) {
        let dirty = self.autosave.try_with_value(Autosave::is_dirty).unwrap_or(false);
        if dirty {
            self.commit(None, None, None);
        } else {
            self.cancel_timer();
        }
    }

    fn write(self, patch: DocumentPatch, previous: String, confirm: Option<ToastQueue>) {
        let (Some(Some(id)), Some(store)) = (self.editing.try_get_value(), self.docs.try_get_value())
        else {
            return;
        };
        let written = patch.content.clone();
        spawn_local(async move {
            match store.update_document(id, patch).await {
                Ok(_) => {
                    if let Some(toasts) = confirm {
                        toasts.notify(ToastLevel::Success, "Document saved".to_string());
                    }
                }
                // The store has already reported the failure.
                Err(_) => {
                    self.autosave
                        .try_update_value(|autosave| autosave.save_failed(&written, &previous));
                }
            }
            self.refresh_status();
        });
    }

    /// Switches the buffer to `doc`, saving unsynced edits of the previous
    /// document first.
    fn load(self, doc: Option<&Document>) {
        self.flush();
        self.editing.set_value(doc.map(|doc| doc.id));
        let content = doc.map(|doc| doc.content.clone()).unwrap_or_default();
        self.autosave.update_value(|autosave| autosave.reset(&content));
        self.draft.set(content);
        self.refresh_status();
    }

    fn adopt(self, doc: &Document) {
        let changed = self
            .autosave
            .try_update_value(|autosave| autosave.sync_external(&doc.content))
            .unwrap_or(false);
        if changed {
            log::debug!("editor picked up external content for {}", doc.id);
            self.cancel_timer();
            self.draft.set(doc.content.clone());
            self.refresh_status();
        }
    }
}

fn is_shortcut(ev: &KeyboardEvent, key: &str) -> bool {
    (ev.ctrl_key() || ev.meta_key()) && ev.key().eq_ignore_ascii_case(key)
}

#[component]
pub fn EditorPane(
    docs: Local<DocumentStore>,
    revision: RwSignal<u64>,
    toasts: ToastQueue,
    draft: RwSignal<String>,
    editor_ref: NodeRef<Textarea>,
    #[prop(into)] on_scroll: Callback<Pane>,
) -> impl IntoView {
    let buffer = Buffer {
        docs,
        autosave: StoredValue::new_local(Autosave::new("")),
        timer: StoredValue::new_local(None),
        editing: StoredValue::new_local(None),
        status: RwSignal::new(AutosaveStatus::Clean),
        draft,
    };
    let (scroll_top, set_scroll_top) = signal(0);

    let current = Memo::new(move |_| {
        revision.track();
        docs.try_with_value(DocumentStore::current).flatten()
    });

    Effect::new(move |previous_run: Option<()>| {
        let doc = current.get();
        let id = doc.as_ref().map(|doc| doc.id);
        if previous_run.is_none() || buffer.editing.get_value() != id {
            buffer.load(doc.as_ref());
        } else if let Some(doc) = &doc {
            buffer.adopt(doc);
        }
    });

    on_cleanup(move || buffer.flush());

    let find = StoredValue::new_local(FindState::new());
    let find_open = RwSignal::new(false);
    let find_status = RwSignal::new(String::new());

    let show_match = move |found: Option<MatchRange>| {
        find_status.set(find.with_value(FindState::status));
        let (Some(range), Some(area)) = (found, editor_ref.get_untracked()) else {
            return;
        };
        let text = draft.get_untracked();
        let (Some((start, end)), Some(before)) = (range.to_utf16(&text), text.get(..range.start))
        else {
            return;
        };
        let _ = area.set_selection_range(start, end);
        let line = before.matches('\n').count();
        let lines = text.matches('\n').count() + 1;
        let target = line as f64 / lines as f64 * f64::from(area.scroll_height())
            - f64::from(area.client_height()) / 2.0;
        area.set_scroll_top(target.max(0.0) as i32);
    };

    let on_query = Callback::new(move |query: String| {
        let text = draft.get_untracked();
        find.update_value(|find| find.search(&text, &query));
        show_match(find.with_value(FindState::current_match));
    });
    let on_next = Callback::new(move |_: ()| {
        let text = draft.get_untracked();
        let found = find.try_update_value(|find| find.next(&text)).flatten();
        show_match(found);
    });
    let on_previous = Callback::new(move |_: ()| {
        let text = draft.get_untracked();
        let found = find.try_update_value(|find| find.previous(&text)).flatten();
        show_match(found);
    });
    let on_close = Callback::new(move |_: ()| {
        find.update_value(FindState::close);
        find_status.set(String::new());
        find_open.set(false);
        if let Some(area) = editor_ref.get_untracked() {
            if let Ok(Some(end)) = area.selection_end() {
                let _ = area.set_selection_range(end, end);
            }
            let _ = area.focus();
        }
    });

    // Typing, switching documents and adopted store content all land here.
    Effect::new(move |_| {
        let text = draft.get();
        if find_open.get_untracked() {
            find.update_value(|find| find.refresh(&text));
            find_status.set(find.with_value(FindState::status));
        }
    });

    let on_input = move |ev| buffer.edit(event_target_value(&ev));

    let on_keydown = move |ev: KeyboardEvent| {
        if is_shortcut(&ev, "s") {
            ev.prevent_default();
            buffer.commit(None, None, Some(toasts));
        } else if is_shortcut(&ev, "f") {
            ev.prevent_default();
            find_open.set(true);
        }
    };

    let title = move || current.get().map(|doc| doc.title).unwrap_or_default();
    let tags = move || current.get().map(|doc| doc.tags.join(", ")).unwrap_or_default();
    let stats = move || {
        let stats = text_stats(&draft.get());
        format!("{} words · {} characters", stats.words, stats.characters)
    };

    view! {
        <section class="editor-pane" on:keydown=on_keydown>
            <Show
                when=move || current.get().is_some()
                fallback=|| view! {
                    <div class="pane-empty">"Select a document or create a new one."</div>
                }
            >
                <header class="pane-header">
                    <input
                        class="title-input"
                        type="text"
                        placeholder="Title"
                        prop:value=title
                        on:change=move |ev| buffer.commit(Some(event_target_value(&ev)), None, None)
                    />
                    <input
                        class="tags-input"
                        type="text"
                        placeholder="Tags, comma separated"
                        prop:value=tags
                        on:change=move |ev| {
                            buffer.commit(None, Some(parse_tag_list(&event_target_value(&ev))), None)
                        }
                    />
                    <button
                        class="save-button"
                        title="Save (Ctrl+S)"
                        on:click=move |_| buffer.commit(None, None, Some(toasts))
                    >
                        "Save"
                    </button>
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
                <div class="editor-container">
                    <div
                        class="markdown-highlight-layer"
                        inner_html=move || highlight_markdown(&draft.get())
                        prop:scrollTop=move || scroll_top.get()
                    ></div>
                    <textarea
                        class="raw-editor"
                        node_ref=editor_ref
                        prop:value=move || draft.get()
                        on:input=on_input
                        on:scroll=move |ev| {
                            let target: web_sys::Element = event_target(&ev);
                            set_scroll_top.set(target.scroll_top());
                            on_scroll.run(Pane::Editor);
                        }
                        placeholder="Start writing markdown..."
                        spellcheck="false"
                    ></textarea>
                </div>
                <footer class="status-line">
                    <span>{stats}</span>
                    <span class="save-status">{move || buffer.status.get().label()}</span>
                </footer>
            </Show>
        </section>
    }
}
