use chrono::{Duration, Utc};
use leptos::prelude::*;
use leptos::task::spawn_local;

use super::toast::ToastQueue;
use super::Local;
use crate::notify::{Notifier, ToastLevel};
use crate::store::session::validate_sign_up;
use crate::store::{SessionStore, SignUpOutcome};

/// How long after a rate-limited response the screen keeps warning.
const RATE_LIMIT_HINT_MINUTES: i64 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AuthMode {
    SignIn,
    SignUp,
    ForgotPassword,
}

impl AuthMode {
    fn heading(self) -> &'static str {
        match self {
            AuthMode::SignIn => "Sign in",
            AuthMode::SignUp => "Create an account",
            AuthMode::ForgotPassword => "Reset your password",
        }
    }

    fn submit_label(self, loading: bool) -> &'static str {
        match (self, loading) {
            (AuthMode::SignIn, false) => "Sign in",
            (AuthMode::SignIn, true) => "Signing in...",
            (AuthMode::SignUp, false) => "Sign up",
            (AuthMode::SignUp, true) => "Signing up...",
            (AuthMode::ForgotPassword, false) => "Send reset link",
            (AuthMode::ForgotPassword, true) => "Sending...",
        }
    }
}

#[component]
pub fn AuthScreen(
    session: Local<SessionStore>,
    revision: RwSignal<u64>,
    toasts: ToastQueue,
) -> impl IntoView {
    let mode = RwSignal::new(AuthMode::SignIn);
    let email: RwSignal<String> = RwSignal::new(String::new());
    let password: RwSignal<String> = RwSignal::new(String::new());
    let confirm: RwSignal<String> = RwSignal::new(String::new());
    let error: RwSignal<Option<String>> = RwSignal::new(None);
    let info: RwSignal<Option<String>> = RwSignal::new(None);

    let loading = Memo::new(move |_| {
        revision.track();
        session.try_with_value(SessionStore::loading).unwrap_or(false)
    });
    let rate_limited = Memo::new(move |_| {
        revision.track();
        session
            .try_with_value(SessionStore::rate_limit_hint)
            .flatten()
            .is_some_and(|at| Utc::now() - at < Duration::minutes(RATE_LIMIT_HINT_MINUTES))
    });

    let switch_to = move |next: AuthMode| {
        mode.set(next);
        error.set(None);
        info.set(None);
        password.set(String::new());
        confirm.set(String::new());
    };

    let on_submit = move |ev: web_sys::SubmitEvent| {
        ev.prevent_default();
        if loading.get_untracked() {
            return;
        }
        let store = session.get_value();
        let email_val = email.get_untracked();
        let password_val = password.get_untracked();
        let current_mode = mode.get_untracked();
        error.set(None);
        info.set(None);

        if current_mode == AuthMode::SignUp {
            if let Err(err) = validate_sign_up(&email_val, &password_val, &confirm.get_untracked()) {
                error.set(Some(err.to_string()));
                return;
            }
        }

        spawn_local(async move {
            match current_mode {
                AuthMode::SignIn => {
                    if let Err(err) = store.sign_in(&email_val, &password_val).await {
                        error.set(Some(err.to_string()));
                    }
                }
                AuthMode::SignUp => match store.sign_up(&email_val, &password_val).await {
                    Ok(SignUpOutcome::SignedIn) => {
                        toasts.notify(ToastLevel::Success, "Account created".to_string());
                    }
                    Ok(SignUpOutcome::ConfirmationRequired) => {
                        let message = "Check your email to confirm your account.".to_string();
                        toasts.notify(ToastLevel::Success, message.clone());
                        info.set(Some(message));
                        mode.set(AuthMode::SignIn);
                    }
                    Err(err) => error.set(Some(err.to_string())),
                },
                AuthMode::ForgotPassword => match store.reset_password(&email_val).await {
                    Ok(()) => {
                        let message = "Password reset email sent.".to_string();
                        toasts.notify(ToastLevel::Success, message.clone());
                        info.set(Some(message));
                    }
                    Err(err) => error.set(Some(err.to_string())),
                },
            }
        });
    };

    view! {
        <div class="auth-screen">
            <div class="auth-card">
                <div class="auth-brand">"Markpad"</div>
                <h1>{move || mode.get().heading()}</h1>

                <form class="auth-form" on:submit=on_submit>
                    <label for="auth-email">"Email"</label>
                    <input
                        id="auth-email"
                        type="email"
                        autocomplete="email"
                        placeholder="you@example.com"
                        prop:value=move || email.get()
                        on:input=move |ev| email.set(event_target_value(&ev))
                    />

                    <Show when=move || mode.get() != AuthMode::ForgotPassword>
                        <label for="auth-password">"Password"</label>
                        <input
                            id="auth-password"
                            type="password"
                            placeholder="••••••••"
                            prop:value=move || password.get()
                            on:input=move |ev| password.set(event_target_value(&ev))
                        />
                    </Show>

                    <Show when=move || mode.get() == AuthMode::SignUp>
                        <label for="auth-confirm">"Confirm password"</label>
                        <input
                            id="auth-confirm"
                            type="password"
                            placeholder="••••••••"
                            prop:value=move || confirm.get()
                            on:input=move |ev| confirm.set(event_target_value(&ev))
                        />
                    </Show>

                    <Show when=move || rate_limited.get()>
                        <p class="auth-hint">
                            "Too many attempts recently. Please wait a moment before trying again."
                        </p>
                    </Show>
                    {move || error.get().map(|message| view! { <p class="auth-error">{message}</p> })}
                    {move || info.get().map(|message| view! { <p class="auth-info">{message}</p> })}

                    <button class="primary-button" type="submit" disabled=move || loading.get()>
                        {move || mode.get().submit_label(loading.get())}
                    </button>
                </form>

                <div class="auth-links">
                    {move || match mode.get() {
                        AuthMode::SignIn => view! {
                            <button class="link-button" on:click=move |_| switch_to(AuthMode::ForgotPassword)>
                                "Forgot password?"
                            </button>
                            <button class="link-button" on:click=move |_| switch_to(AuthMode::SignUp)>
                                "No account? Sign up"
                            </button>
                        }.into_any(),
                        AuthMode::SignUp | AuthMode::ForgotPassword => view! {
                            <button class="link-button" on:click=move |_| switch_to(AuthMode::SignIn)>
                                "Back to sign in"
                            </button>
                        }.into_any(),
                    }}
                </div>
            </div>
        </div>
    }
}
