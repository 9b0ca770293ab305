mod app;
mod autosave;
mod backend;
mod clock;
mod components;
mod config;
mod error;
mod export;
mod find;
mod import;
mod listeners;
mod markdown;
mod model;
mod notify;
mod scroll_sync;
mod storage;
mod store;

use app::*;
use config::AppConfig;
use leptos::prelude::*;

fn main() {
    console_error_panic_hook::set_once();

    match AppConfig::load() {
        Ok(config) => {
            if let Err(err) = console_log::init_with_level(config.log_level) {
                web_sys::console::warn_1(&format!("logger already initialized: {err}").into());
            }
            log::info!("starting markpad against {}", config.supabase_url);
            mount_to_body(move || {
                view! { <App config=config/> }
            })
        }
        Err(err) => {
            let _ = console_log::init_with_level(log::Level::Warn);
            log::error!("invalid configuration: {err}");
            let message = err.to_string();
            mount_to_body(move || {
                view! { <ConfigErrorView message=message/> }
            })
        }
    }
}
