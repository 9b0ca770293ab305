use leptos::prelude::*;

use super::Local;
use crate::model::{EditorTheme, Preferences, PreviewTheme, MAX_FONT_SIZE, MIN_FONT_SIZE};
use crate::store::DocumentStore;

#[component]
fn Toggle(
    label: &'static str,
    #[prop(into)] checked: Signal<bool>,
    #[prop(into)] on_change: Callback<bool>,
) -> impl IntoView {
    view! {
        <label class="settings-toggle">
            <input
                type="checkbox"
                prop:checked=move || checked.get()
                on:change=move |ev| on_change.run(event_target_checked(&ev))
            />
            <span>{label}</span>
        </label>
    }
}

#[component]
pub fn SettingsPanel(
    docs: Local<DocumentStore>,
    #[prop(into)] preferences: Signal<Preferences>,
    #[prop(into)] on_close: Callback<()>,
) -> impl IntoView {
    let update = move |change: Box<dyn FnOnce(&mut Preferences)>| {
        docs.with_value(|docs| docs.update_preferences(change));
    };

    let flag = move |read: fn(&Preferences) -> bool, write: fn(&mut Preferences, bool)| {
        (
            Signal::derive(move || read(&preferences.get())),
            Callback::new(move |value: bool| update(Box::new(move |prefs| write(prefs, value)))),
        )
    };
    let (autosave, set_autosave) = flag(|p| p.autosave, |p, v| p.autosave = v);
    let (dark_mode, set_dark_mode) = flag(|p| p.dark_mode, |p, v| p.dark_mode = v);
    let (sync_scroll, set_sync_scroll) = flag(|p| p.sync_scroll, |p, v| p.sync_scroll = v);
    let (show_sidebar, set_show_sidebar) = flag(|p| p.show_sidebar, |p, v| p.show_sidebar = v);
    let (show_editor, set_show_editor) = flag(|p| p.show_editor, |p, v| p.show_editor = v);
    let (show_preview, set_show_preview) = flag(|p| p.show_preview, |p, v| p.show_preview = v);

    view! {
        <div class="modal-backdrop" on:click=move |_| on_close.run(())>
            <div class="modal settings-panel" on:click=|ev| ev.stop_propagation()>
                <header class="modal-header">
                    <h2>"Settings"</h2>
                    <button class="icon-button" title="Close" on:click=move |_| on_close.run(())>"×"</button>
                </header>

                <h3>"Appearance"</h3>
                <label class="settings-field">
                    <span>"Editor theme"</span>
                    <select on:change=move |ev| {
                        if let Some(theme) = EditorTheme::from_name(&event_target_value(&ev)) {
                            update(Box::new(move |prefs| prefs.editor_theme = theme));
                        }
                    }>
                        {EditorTheme::ALL.into_iter().map(|theme| view! {
                            <option
                                value=theme.name()
                                prop:selected=move || preferences.get().editor_theme == theme
                            >
                                {theme.label()}
                            </option>
                        }).collect::<Vec<_>>()}
                    </select>
                </label>
                <label class="settings-field">
                    <span>"Preview theme"</span>
                    <select on:change=move |ev| {
                        if let Some(theme) = PreviewTheme::from_name(&event_target_value(&ev)) {
                            update(Box::new(move |prefs| prefs.preview_theme = theme));
                        }
                    }>
                        {PreviewTheme::ALL.into_iter().map(|theme| view! {
                            <option
                                value=theme.name()
                                prop:selected=move || preferences.get().preview_theme == theme
                            >
                                {theme.label()}
                            </option>
                        }).collect::<Vec<_>>()}
                    </select>
                </label>
                <label class="settings-field">
                    <span>{move || format!("Font size ({}px)", preferences.get().font_size)}</span>
                    <input
                        type="range"
                        min=MIN_FONT_SIZE.to_string()
                        max=MAX_FONT_SIZE.to_string()
                        prop:value=move || preferences.get().font_size.to_string()
                        on:input=move |ev| {
                            if let Ok(size) = event_target_value(&ev).parse::<u32>() {
                                update(Box::new(move |prefs| prefs.font_size = size));
                            }
                        }
                    />
                </label>
                <Toggle label="Dark mode" checked=dark_mode on_change=set_dark_mode/>

                <h3>"Editing"</h3>
                <Toggle label="Autosave" checked=autosave on_change=set_autosave/>
                <Toggle label="Synchronize scrolling" checked=sync_scroll on_change=set_sync_scroll/>

                <h3>"Layout"</h3>
                <Toggle label="Show sidebar" checked=show_sidebar on_change=set_show_sidebar/>
                <Toggle label="Show editor" checked=show_editor on_change=set_show_editor/>
                <Toggle label="Show preview" checked=show_preview on_change=set_show_preview/>
            </div>
        </div>
    }
}
