use std::time::Duration;

use leptos::leptos_dom::helpers::{set_timeout_with_handle, TimeoutHandle};
use leptos::prelude::*;
use leptos::task::spawn_local;
use wasm_bindgen::prelude::Closure;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::preview::{
    fetch_doi_preview, fetch_wiki_preview, DoiMetadata, PreviewTarget, WikiSummary,
    DOI_LOAD_ERROR, WIKI_LOAD_ERROR,
};
use crate::renderer::{
    external_href, markdown_inline_view, markdown_view, NestedRender, PreviewRequest,
    RenderHooksHandle,
};
use crate::syntax::{preprocess, CalloutKind};

pub const HOVER_DELAY_MS: u64 = 300;
pub const COPY_RESET_MS: u64 = 2000;

type TimerSlot = StoredValue<Option<TimeoutHandle>, LocalStorage>;

fn schedule(slot: TimerSlot, delay_ms: u64, f: impl FnOnce() + 'static) {
    if let Some(handle) = slot.get_value() {
        handle.clear();
    }
    if let Ok(handle) = set_timeout_with_handle(f, Duration::from_millis(delay_ms)) {
        slot.set_value(Some(handle));
    }
}

fn cancel(slot: TimerSlot) {
    if let Some(handle) = slot.get_value() {
        handle.clear();
    }
    slot.set_value(None);
}

type ListenerSlot = StoredValue<Option<Closure<dyn FnMut(web_sys::MouseEvent)>>, LocalStorage>;

/// Document-level mousedown listener that detaches when the owning component
/// is disposed. The closure stays in local storage; cleanup captures only the
/// arena handle.
fn on_document_mousedown(handler: impl FnMut(web_sys::MouseEvent) + 'static) {
    let closure = Closure::<dyn FnMut(web_sys::MouseEvent)>::wrap(Box::new(handler));
    if let Some(document) = web_sys::window().and_then(|w| w.document()) {
        let _ = document
            .add_event_listener_with_callback("mousedown", closure.as_ref().unchecked_ref());
    }
    let slot: ListenerSlot = StoredValue::new_local(Some(closure));
    on_cleanup(move || {
        slot.try_update_value(|stored| {
            if let Some(closure) = stored.take() {
                if let Some(document) = web_sys::window().and_then(|w| w.document()) {
                    let _ = document.remove_event_listener_with_callback(
                        "mousedown",
                        closure.as_ref().unchecked_ref(),
                    );
                }
            }
        });
    });
}

/// Internal/wiki/doi link. Hover shows a mini preview after a short delay,
/// click opens the full preview popup. Inside a popup the same link opens in
/// a new tab instead.
#[component]
pub fn Greenlink(href: String, label: String) -> impl IntoView {
    let hovered = RwSignal::new(false);
    let show_timer: TimerSlot = StoredValue::new_local(None);
    let hide_timer: TimerSlot = StoredValue::new_local(None);

    let nested = use_context::<NestedRender>().map(|n| n.0).unwrap_or(false);
    let request = use_context::<PreviewRequest>();
    let hooks = use_context::<RenderHooksHandle>()
        .map(|h| h.get())
        .unwrap_or_default();

    let href_click = href.clone();
    let on_click = move |ev: web_sys::MouseEvent| {
        ev.prevent_default();
        if nested {
            if let Some(window) = web_sys::window() {
                let _ = window.open_with_url_and_target(&external_href(&href_click), "_blank");
            }
        } else {
            if let Some(callback) = hooks.on_link_click {
                callback.run(href_click.clone());
            }
            if let Some(request) = request {
                request.0.set(Some(href_click.clone()));
            }
        }
    };

    let on_enter = move |_| {
        cancel(hide_timer);
        schedule(show_timer, HOVER_DELAY_MS, move || {
            hovered.try_set(true);
        });
    };
    let on_leave = move |_| {
        cancel(show_timer);
        schedule(hide_timer, HOVER_DELAY_MS, move || {
            hovered.try_set(false);
        });
    };

    let hover_label = label.clone();
    let hover_href = href.clone();
    view! {
        <span class="greenlink-wrap">
            <a
                class="greenlink"
                href=external_href(&href)
                on:click=on_click
                on:mouseenter=on_enter
                on:mouseleave=on_leave
            >
                {label}
            </a>
            <Show when=move || hovered.get()>
                <span class="greenlink-hover">
                    <span class="greenlink-hover-title">{hover_label.clone()}</span>
                    <span class="greenlink-hover-href">{hover_href.clone()}</span>
                </span>
            </Show>
        </span>
    }
}

#[derive(Clone)]
enum PreviewState {
    Loading,
    Wiki(WikiSummary),
    Doi(DoiMetadata),
    Markdown(String),
    Empty,
    Failed(&'static str),
}

/// Floating preview card for a greenlink target. Fetches on mount, dismissed
/// by the close button or any click outside the card.
#[component]
pub fn PreviewPopup(url: String, #[prop(into)] on_close: Callback<()>) -> impl IntoView {
    let state = RwSignal::new(PreviewState::Loading);
    let target = PreviewTarget::classify(&url);
    let hooks = use_context::<RenderHooksHandle>()
        .map(|h| h.get())
        .unwrap_or_default();

    provide_context(NestedRender(true));

    {
        let target = target.clone();
        let provider = hooks.preview_content.clone();
        spawn_local(async move {
            let next = match target {
                PreviewTarget::Wiki(title) => match fetch_wiki_preview(&title).await {
                    Ok(summary) => PreviewState::Wiki(summary),
                    Err(err) => {
                        leptos::logging::warn!("wikipedia preview failed: {err}");
                        PreviewState::Failed(WIKI_LOAD_ERROR)
                    }
                },
                PreviewTarget::Doi(id) => match fetch_doi_preview(&id).await {
                    Ok(meta) => PreviewState::Doi(meta),
                    Err(err) => {
                        leptos::logging::warn!("doi preview failed: {err}");
                        PreviewState::Failed(DOI_LOAD_ERROR)
                    }
                },
                PreviewTarget::External(url) => match provider {
                    Some(provider) => PreviewState::Markdown(provider(url).await),
                    None => PreviewState::Empty,
                },
            };
            state.try_set(next);
        });
    }

    let popup_ref = NodeRef::<leptos::html::Div>::new();
    on_document_mousedown(move |ev: web_sys::MouseEvent| {
        let inside = popup_ref
            .get_untracked()
            .and_then(|el| {
                let node = ev.target()?.dyn_into::<web_sys::Node>().ok()?;
                Some(el.contains(Some(&node)))
            })
            .unwrap_or(true);
        if !inside {
            on_close.run(());
        }
    });

    view! {
        <div class="preview-popup" node_ref=popup_ref>
            <div class="preview-popup-header">
                <a class="preview-popup-link" href=target.external_url() target="_blank">
                    "Open"
                </a>
                <button class="preview-popup-close" on:click=move |_| on_close.run(())>
                    "×"
                </button>
            </div>
            <div class="preview-popup-body">
                {move || match state.get() {
                    PreviewState::Loading => {
                        view! { <div class="preview-loading">"Loading…"</div> }.into_any()
                    }
                    PreviewState::Wiki(summary) => wiki_preview_view(&summary),
                    PreviewState::Doi(meta) => doi_preview_view(&meta),
                    PreviewState::Markdown(md) => markdown_view(&preprocess(&md)),
                    PreviewState::Empty => view! { <div class="preview-empty"></div> }.into_any(),
                    PreviewState::Failed(message) => {
                        view! { <div class="error-message">{message}</div> }.into_any()
                    }
                }}
            </div>
        </div>
    }
}

fn wiki_preview_view(summary: &WikiSummary) -> AnyView {
    let extract = match &summary.extract_html {
        Some(html) => view! { <div class="wiki-extract" inner_html=html.clone()></div> }.into_any(),
        None => view! { <div class="wiki-extract">{summary.extract.clone()}</div> }.into_any(),
    };
    view! {
        <div class="wiki-preview">
            <h3 class="wiki-title">{summary.title.clone()}</h3>
            {summary
                .description
                .clone()
                .map(|d| view! { <em class="wiki-description">{d}</em> }.into_any())}
            {extract}
            {summary
                .last_modified
                .clone()
                .map(|ts| {
                    view! { <div class="wiki-modified">"Last modified: " {ts}</div> }.into_any()
                })}
        </div>
    }
    .into_any()
}

fn doi_preview_view(meta: &DoiMetadata) -> AnyView {
    view! {
        <div class="doi-preview">
            <h3 class="doi-title">{meta.title.clone()}</h3>
            <div class="doi-authors">{meta.authors.join(", ")}</div>
            {meta
                .abstract_text
                .clone()
                .map(|text| view! { <p class="doi-abstract">{text}</p> }.into_any())}
            <div class="doi-citation">{meta.citation()}</div>
        </div>
    }
    .into_any()
}

/// Obscured text revealed by a click and hidden again by clicking anywhere
/// outside it.
#[component]
pub fn Spoiler(body: AnyView) -> impl IntoView {
    let revealed = RwSignal::new(false);
    let node = NodeRef::<leptos::html::Span>::new();

    on_document_mousedown(move |ev: web_sys::MouseEvent| {
        if !revealed.get_untracked() {
            return;
        }
        let inside = node
            .get_untracked()
            .and_then(|el| {
                let target = ev.target()?.dyn_into::<web_sys::Node>().ok()?;
                Some(el.contains(Some(&target)))
            })
            .unwrap_or(true);
        if !inside {
            revealed.try_set(false);
        }
    });

    view! {
        <span
            class="spoiler"
            class:revealed=move || revealed.get()
            role="button"
            aria-label="spoiler"
            node_ref=node
            on:click=move |_| revealed.update(|r| *r = !*r)
        >
            <span class="spoiler-content">{body}</span>
            <span class="spoiler-overlay">
                {move || if revealed.get() { "Hide" } else { "Reveal" }}
            </span>
        </span>
    }
}

/// Highlighted block with a type icon. The icon can be overridden per kind
/// through [`crate::renderer::RenderHooks`].
#[component]
pub fn Callout(kind: CalloutKind, body: AnyView) -> impl IntoView {
    let hooks = use_context::<RenderHooksHandle>()
        .map(|h| h.get())
        .unwrap_or_default();
    let icon = hooks
        .callout_icon
        .map(|pick| pick(kind))
        .unwrap_or_else(|| kind.icon());

    view! {
        <div class=format!("callout callout-{}", kind.as_str())>
            <span class="callout-icon">{icon}</span>
            <div class="callout-content">{body}</div>
        </div>
    }
}

/// A `?` marker whose tooltip renders the aside content as markdown.
#[component]
pub fn QuickAside(content: String) -> impl IntoView {
    let hovered = RwSignal::new(false);
    let show_timer: TimerSlot = StoredValue::new_local(None);
    let hide_timer: TimerSlot = StoredValue::new_local(None);

    let on_enter = move |_| {
        cancel(hide_timer);
        schedule(show_timer, HOVER_DELAY_MS, move || {
            hovered.try_set(true);
        });
    };
    let on_leave = move |_| {
        cancel(show_timer);
        schedule(hide_timer, HOVER_DELAY_MS, move || {
            hovered.try_set(false);
        });
    };

    view! {
        <span class="quick-aside" on:mouseenter=on_enter on:mouseleave=on_leave>
            <span class="quick-aside-marker">"?"</span>
            <Show when=move || hovered.get()>
                <span class="quick-aside-tooltip">
                    {markdown_inline_view(&preprocess(&content))}
                </span>
            </Show>
        </span>
    }
}

/// Fenced code with line numbers and a copy button that acknowledges for a
/// couple of seconds.
#[component]
pub fn CodeBlock(code: String, language: String) -> impl IntoView {
    let copied = RwSignal::new(false);
    let reset_timer: TimerSlot = StoredValue::new_local(None);
    let hooks = use_context::<RenderHooksHandle>()
        .map(|h| h.get())
        .unwrap_or_default();

    let rows: Vec<AnyView> = code
        .trim_end_matches('\n')
        .lines()
        .enumerate()
        .map(|(i, line)| {
            view! {
                <span class="code-line">
                    <span class="line-number">{i + 1}</span>
                    <span class="line-text">{line.to_string()}</span>
                </span>
            }
            .into_any()
        })
        .collect();

    let on_copy = move |_| {
        let text = code.clone();
        let handler = hooks.on_copy.clone();
        spawn_local(async move {
            match handler {
                Some(handler) => handler(text).await,
                None => copy_to_clipboard(&text).await,
            }
            copied.try_set(true);
            schedule(reset_timer, COPY_RESET_MS, move || {
                copied.try_set(false);
            });
        });
    };

    view! {
        <div class="code-block">
            <div class="code-block-header">
                <span class="code-block-lang">{language}</span>
                <button class="code-block-copy" on:click=on_copy>
                    {move || if copied.get() { "✓ Copied!" } else { "Copy" }}
                </button>
            </div>
            <pre class="code-block-body"><code>{rows}</code></pre>
        </div>
    }
}

async fn copy_to_clipboard(text: &str) {
    if let Some(window) = web_sys::window() {
        let promise = window.navigator().clipboard().write_text(text);
        let _ = JsFuture::from(promise).await;
    }
}
