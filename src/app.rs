use std::rc::Rc;

use gloo_timers::callback::Timeout;
use leptos::html::{Div, Textarea};
use leptos::prelude::*;
use leptos::task::spawn_local;

use crate::backend::supabase::SupabaseClient;
use crate::clock::{BrowserClock, Clock};
use crate::components::auth::AuthScreen;
use crate::components::editor::EditorPane;
use crate::components::preview::PreviewPane;
use crate::components::settings::SettingsPanel;
use crate::components::sidebar::Sidebar;
use crate::components::toast::{ToastQueue, ToastStack};
use crate::components::Local;
use crate::config::AppConfig;
use crate::model::Preferences;
use crate::scroll_sync::{Pane, ScrollMetrics, ScrollSync, SCROLL_DEBOUNCE_MS};
use crate::storage::{BrowserStorage, KeyValueStore, MemoryStore};
use crate::store::{DocumentStore, SessionStore};

fn open_storage() -> Rc<dyn KeyValueStore> {
    match BrowserStorage::open() {
        Some(storage) => Rc::new(storage),
        None => {
            log::warn!("localStorage unavailable, sessions will not survive a reload");
            Rc::new(MemoryStore::new())
        }
    }
}

fn dynamic_style(prefs: &Preferences) -> String {
    format!("--editor-font-size: {}px;", prefs.font_size)
}

fn layout_class(prefs: &Preferences) -> String {
    let mut class = format!(
        "app-layout editor-theme-{} preview-theme-{}",
        prefs.editor_theme.name(),
        prefs.preview_theme.name()
    );
    if prefs.dark_mode {
        class.push_str(" dark");
    }
    class
}

/// Proportional scroll coupling between the two panes, driven by debounced
/// scroll events from either side.
#[derive(Clone, Copy)]
struct PaneSync {
    editor: NodeRef<Textarea>,
    preview: NodeRef<Div>,
    state: Local<ScrollSync>,
    timer: Local<Option<Timeout>>,
}

impl PaneSync {
    fn element(self, pane: Pane) -> Option<web_sys::Element> {
        match pane {
            Pane::Editor => self.editor.get_untracked().map(Into::into),
            Pane::Preview => self.preview.get_untracked().map(Into::into),
        }
    }

    fn schedule(self, source: Pane) {
        let timer = Timeout::new(SCROLL_DEBOUNCE_MS, move || self.sync(source));
        self.timer.try_set_value(Some(timer));
    }

    fn sync(self, source: Pane) {
        let (Some(from), Some(to)) = (self.element(source), self.element(source.other())) else {
            return;
        };
        let now = BrowserClock.now();
        let update = self
            .state
            .try_update_value(|sync| {
                sync.on_scroll(source, &ScrollMetrics::of(&from), &ScrollMetrics::of(&to), now)
            })
            .flatten();
        if let Some(update) = update {
            to.set_scroll_top(update.scroll_top as i32);
        }
    }
}

#[component]
pub fn App(config: AppConfig) -> impl IntoView {
    let storage = open_storage();
    let clock: Rc<dyn Clock> = Rc::new(BrowserClock);
    let client = Rc::new(SupabaseClient::new(config, storage.clone(), clock.clone()));
    let toasts = ToastQueue::new();

    let session_store = SessionStore::new(client.clone(), storage, clock.clone());
    let doc_store = DocumentStore::new(client.clone(), Rc::new(toasts), clock);

    let session_rev = RwSignal::new(0u64);
    let docs_rev = RwSignal::new(0u64);
    // Owned by the reactive tree so the signals detach when the app unmounts.
    let _subscriptions = StoredValue::new_local((
        session_store.subscribe(move || session_rev.update(|rev| *rev += 1)),
        doc_store.subscribe(move || docs_rev.update(|rev| *rev += 1)),
    ));
    session_store.init();

    let session: Local<SessionStore> = StoredValue::new_local(session_store);
    let docs: Local<DocumentStore> = StoredValue::new_local(doc_store);

    spawn_local(async move {
        client.refresh_if_expired().await;
    });

    on_cleanup(move || {
        session.try_with_value(SessionStore::teardown);
    });

    let owner = Memo::new(move |_| {
        session_rev.track();
        session
            .try_with_value(SessionStore::user)
            .flatten()
            .map(|user| user.id)
    });
    let email = Memo::new(move |_| {
        session_rev.track();
        session
            .try_with_value(SessionStore::user)
            .flatten()
            .and_then(|user| user.email)
            .unwrap_or_default()
    });

    Effect::new(move |_| {
        let owner = owner.get();
        let store = docs.get_value();
        spawn_local(async move {
            store.set_owner(owner).await;
        });
    });

    let prefs = Memo::new(move |_| {
        docs_rev.track();
        docs.try_with_value(DocumentStore::preferences).unwrap_or_default()
    });
    let current = Memo::new(move |_| {
        docs_rev.track();
        docs.try_with_value(DocumentStore::current).flatten()
    });

    let draft = RwSignal::new(String::new());
    let editor_ref = NodeRef::<Textarea>::new();
    let preview_ref = NodeRef::<Div>::new();
    let pane_sync = PaneSync {
        editor: editor_ref,
        preview: preview_ref,
        state: StoredValue::new_local(ScrollSync::default()),
        timer: StoredValue::new_local(None),
    };
    let on_pane_scroll = Callback::new(move |source: Pane| {
        if prefs.get_untracked().sync_scroll {
            pane_sync.schedule(source);
        }
    });

    // With the editor hidden the preview follows the stored content.
    let preview_source = Signal::derive(move || {
        if prefs.get().show_editor {
            draft.get()
        } else {
            current.get().map(|doc| doc.content).unwrap_or_default()
        }
    });
    let preview_title = Signal::derive(move || current.get().map(|doc| doc.title));

    let settings_open = RwSignal::new(false);
    let toggle = move |flip: fn(&mut Preferences)| docs.with_value(|docs| docs.update_preferences(flip));

    let sign_out = move |_| {
        let store = session.get_value();
        spawn_local(async move {
            if let Err(err) = store.sign_out().await {
                log::warn!("sign-out reported an error: {err}");
            }
        });
    };

    let workspace = move || {
        view! {
            <header class="topbar">
                <span class="brand">"Markpad"</span>
                <div class="topbar-actions">
                    <button
                        class:active=move || prefs.get().show_sidebar
                        title="Toggle sidebar"
                        on:click=move |_| toggle(|p| p.show_sidebar = !p.show_sidebar)
                    >
                        "Sidebar"
                    </button>
                    <button
                        class:active=move || prefs.get().show_editor
                        title="Toggle editor"
                        on:click=move |_| toggle(|p| p.show_editor = !p.show_editor)
                    >
                        "Editor"
                    </button>
                    <button
                        class:active=move || prefs.get().show_preview
                        title="Toggle preview"
                        on:click=move |_| toggle(|p| p.show_preview = !p.show_preview)
                    >
                        "Preview"
                    </button>
                    <button title="Settings" on:click=move |_| settings_open.set(true)>"⚙"</button>
                    <span class="user-email">{move || email.get()}</span>
                    <button title="Sign out" on:click=sign_out>"Sign out"</button>
                </div>
            </header>
            <div class="workspace">
                <Show when=move || prefs.get().show_sidebar>
                    <Sidebar docs=docs revision=docs_rev toasts=toasts/>
                </Show>
                <Show when=move || prefs.get().show_editor>
                    <EditorPane
                        docs=docs
                        revision=docs_rev
                        toasts=toasts
                        draft=draft
                        editor_ref=editor_ref
                        on_scroll=on_pane_scroll
                    />
                </Show>
                <Show when=move || prefs.get().show_preview>
                    <PreviewPane
                        source=preview_source
                        title=preview_title
                        toasts=toasts
                        preview_ref=preview_ref
                        on_scroll=on_pane_scroll
                    />
                </Show>
            </div>
            <Show when=move || settings_open.get()>
                <SettingsPanel
                    docs=docs
                    preferences=prefs
                    on_close=Callback::new(move |_: ()| settings_open.set(false))
                />
            </Show>
        }
    };

    view! {
        <main class=move || layout_class(&prefs.get()) style=move || dynamic_style(&prefs.get())>
            {move || if owner.get().is_some() {
                workspace().into_any()
            } else {
                view! { <AuthScreen session=session revision=session_rev toasts=toasts/> }.into_any()
            }}
            <ToastStack queue=toasts/>
        </main>
    }
}

/// Shown instead of the app when the backend settings are missing or
/// malformed.
#[component]
pub fn ConfigErrorView(message: String) -> impl IntoView {
    view! {
        <main class="config-error">
            <h1>"Markpad is not configured"</h1>
            <p>{message}</p>
            <p>
                "Set window.MARKPAD_CONFIG in index.html or build with "
                <code>"MARKPAD_SUPABASE_URL"</code>
                " and "
                <code>"MARKPAD_SUPABASE_ANON_KEY"</code>
                "."
            </p>
        </main>
    }
}
