use chrono::{DateTime, Utc};
use gloo_timers::callback::Timeout;
use leptos::ev::{DragEvent, KeyboardEvent};
use leptos::html::Input;
use leptos::prelude::*;
use leptos::task::spawn_local;
use uuid::Uuid;

use super::toast::ToastQueue;
use super::Local;
use crate::import::import_files;
use crate::model::Document;
use crate::store::DocumentStore;

const SEARCH_DEBOUNCE_MS: u32 = 300;

/// "just now", "5 minutes ago", "yesterday", then a plain date.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - then;
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {unit} ago")
        } else {
            format!("{n} {unit}s ago")
        }
    };
    if elapsed.num_seconds() < 60 {
        "just now".to_string()
    } else if elapsed.num_minutes() < 60 {
        plural(elapsed.num_minutes(), "minute")
    } else if elapsed.num_hours() < 24 {
        plural(elapsed.num_hours(), "hour")
    } else if elapsed.num_days() == 1 {
        "yesterday".to_string()
    } else if elapsed.num_days() < 7 {
        plural(elapsed.num_days(), "day")
    } else {
        then.format("%b %-d, %Y").to_string()
    }
}

fn file_list(files: Option<web_sys::FileList>) -> Vec<web_sys::File> {
    let Some(files) = files else {
        return Vec::new();
    };
    (0..files.length()).filter_map(|i| files.item(i)).collect()
}

fn spawn_import(docs: Local<DocumentStore>, toasts: ToastQueue, files: Vec<web_sys::File>) {
    if files.is_empty() {
        return;
    }
    let store = docs.get_value();
    spawn_local(async move {
        let summary = import_files(&store, &toasts, &files).await;
        log::info!(
            "import finished: {} imported, {} failed",
            summary.imported.len(),
            summary.failed.len()
        );
    });
}

#[component]
fn DocumentRow(
    doc: Document,
    docs: Local<DocumentStore>,
    #[prop(into)] active: Signal<bool>,
    renaming: RwSignal<Option<Uuid>>,
    confirm_delete: RwSignal<Option<Uuid>>,
) -> impl IntoView {
    let id = doc.id;
    let updated = relative_time(doc.updated_at, Utc::now());
    let title = doc.title.clone();
    let tags = doc.tags.clone();

    let commit_rename = move |value: String| {
        renaming.set(None);
        let store = docs.get_value();
        spawn_local(async move {
            let _ = store.rename(id, &value).await;
        });
    };
    let on_rename_key = move |ev: KeyboardEvent| match ev.key().as_str() {
        "Enter" => {
            ev.prevent_default();
            commit_rename(event_target_value(&ev));
        }
        "Escape" => renaming.set(None),
        _ => {}
    };
    let delete = move |_| {
        confirm_delete.set(None);
        let store = docs.get_value();
        spawn_local(async move {
            let _ = store.delete_document(id).await;
        });
    };

    view! {
        <li
            class="doc-item"
            class:active=move || active.get()
            on:click=move |_| {
                docs.with_value(|docs| docs.select(id));
            }
            on:dblclick=move |_| renaming.set(Some(id))
        >
            {move || if renaming.get() == Some(id) {
                view! {
                    <input
                        class="rename-input"
                        type="text"
                        value=title.clone()
                        autofocus=true
                        on:click=|ev| ev.stop_propagation()
                        on:keydown=on_rename_key
                        on:blur=move |_| renaming.set(None)
                    />
                }.into_any()
            } else {
                view! { <span class="doc-title">{title.clone()}</span> }.into_any()
            }}
            <span class="doc-meta">{updated.clone()}</span>
            <span class="doc-tags">
                {tags.iter().map(|tag| view! { <span class="tag">{tag.clone()}</span> }).collect::<Vec<_>>()}
            </span>
            {move || if confirm_delete.get() == Some(id) {
                view! {
                    <span class="doc-confirm" on:click=|ev| ev.stop_propagation()>
                        "Delete?"
                        <button class="danger" on:click=delete>"Yes"</button>
                        <button on:click=move |_| confirm_delete.set(None)>"No"</button>
                    </span>
                }.into_any()
            } else {
                view! {
                    <span class="doc-actions" on:click=|ev| ev.stop_propagation()>
                        <button title="Rename" on:click=move |_| renaming.set(Some(id))>"✎"</button>
                        <button title="Delete" on:click=move |_| confirm_delete.set(Some(id))>"🗑"</button>
                    </span>
                }.into_any()
            }}
        </li>
    }
}

#[component]
pub fn Sidebar(docs: Local<DocumentStore>, revision: RwSignal<u64>, toasts: ToastQueue) -> impl IntoView {
    let file_input = NodeRef::<Input>::new();
    let drag_active = RwSignal::new(false);
    let renaming: RwSignal<Option<Uuid>> = RwSignal::new(None);
    let confirm_delete: RwSignal<Option<Uuid>> = RwSignal::new(None);
    let search_timer: Local<Option<Timeout>> = StoredValue::new_local(None);
    on_cleanup(move || {
        search_timer.try_update_value(|timer| timer.take());
    });

    let documents = Memo::new(move |_| {
        revision.track();
        docs.try_with_value(DocumentStore::documents).unwrap_or_default()
    });
    let current_id = Memo::new(move |_| {
        revision.track();
        docs.try_with_value(DocumentStore::current_id).flatten()
    });
    let known_tags = Memo::new(move |_| {
        revision.track();
        docs.try_with_value(DocumentStore::known_tags).unwrap_or_default()
    });
    let selected_tags = Memo::new(move |_| {
        revision.track();
        docs.try_with_value(DocumentStore::selected_tags).unwrap_or_default()
    });
    let loading = Memo::new(move |_| {
        revision.track();
        docs.try_with_value(DocumentStore::loading).unwrap_or(false)
    });

    let on_search = move |ev| {
        let query = event_target_value(&ev);
        let timer = Timeout::new(SEARCH_DEBOUNCE_MS, move || {
            let store = docs.get_value();
            spawn_local(async move {
                let _ = store.set_query(&query).await;
            });
        });
        search_timer.set_value(Some(timer));
    };

    let create = move |_| {
        let store = docs.get_value();
        spawn_local(async move {
            let _ = store.create_document().await;
        });
    };

    let on_files_picked = move |_| {
        let Some(input) = file_input.get_untracked() else {
            return;
        };
        spawn_import(docs, toasts, file_list(input.files()));
        input.set_value("");
    };

    let on_drop = move |ev: DragEvent| {
        ev.prevent_default();
        drag_active.set(false);
        let files = file_list(ev.data_transfer().and_then(|transfer| transfer.files()));
        spawn_import(docs, toasts, files);
    };

    view! {
        <nav
            class="sidebar"
            class:drag-active=move || drag_active.get()
            on:dragover=move |ev: DragEvent| {
                ev.prevent_default();
                drag_active.set(true);
            }
            on:dragleave=move |_| drag_active.set(false)
            on:drop=on_drop
        >
            <div class="sidebar-header">
                <span>"Documents"</span>
                <div class="sidebar-actions">
                    <button title="New document" on:click=create>"+"</button>
                    <button
                        title="Import markdown files"
                        on:click=move |_| {
                            if let Some(input) = file_input.get_untracked() {
                                input.click();
                            }
                        }
                    >
                        "⇪"
                    </button>
                    <input
                        node_ref=file_input
                        type="file"
                        accept=".md,text/markdown,text/plain"
                        multiple=true
                        style="display: none;"
                        on:change=on_files_picked
                    />
                </div>
            </div>

            <input
                class="sidebar-search"
                type="search"
                placeholder="Search documents"
                on:input=on_search
            />

            <div class="tag-chips">
                {move || {
                    let selected = selected_tags.get();
                    known_tags.get().into_iter().map(|tag| {
                        let is_selected = selected.contains(&tag);
                        let toggle = tag.clone();
                        view! {
                            <button
                                class="tag-chip"
                                class:selected=is_selected
                                on:click=move |_| {
                                    let store = docs.get_value();
                                    let tag = toggle.clone();
                                    spawn_local(async move {
                                        let _ = store.toggle_tag(&tag).await;
                                    });
                                }
                            >
                                {tag}
                            </button>
                        }
                    }).collect::<Vec<_>>()
                }}
            </div>

            <ul class="doc-list">
                {move || documents.get().into_iter().map(|doc| {
                    let id = doc.id;
                    view! {
                        <DocumentRow
                            doc=doc
                            docs=docs
                            active=Signal::derive(move || current_id.get() == Some(id))
                            renaming=renaming
                            confirm_delete=confirm_delete
                        />
                    }
                }).collect::<Vec<_>>()}
            </ul>

            <Show when=move || loading.get()>
                <div class="sidebar-loading">"Loading..."</div>
            </Show>
            <Show when=move || !loading.get() && documents.get().is_empty()>
                <div class="sidebar-empty">"No documents. Create one or drop .md files here."</div>
            </Show>
        </nav>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn relative_times_read_naturally() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(relative_time(now - Duration::seconds(10), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(relative_time(now - Duration::minutes(42), now), "42 minutes ago");
        assert_eq!(relative_time(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(relative_time(now - Duration::hours(30), now), "yesterday");
        assert_eq!(relative_time(now - Duration::days(3), now), "3 days ago");
        assert_eq!(relative_time(now - Duration::days(30), now), "Oct 15, 2023");
    }
}
