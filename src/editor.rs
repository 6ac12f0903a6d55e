use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use leptos::leptos_dom::helpers::request_animation_frame;
use leptos::prelude::*;
use leptos::task::spawn_local;

use crate::editor_core::{
    byte_offset_from_utf16, callout_insertion, completion_context, completion_transaction,
    CompletionKind, EditorSnapshot, Selection, utf16_offset_from_byte, wiki_link_insertion,
};
use crate::fuzzy::{rank_callouts, rank_links, LinkSuggestion};

/// Host lookup for wiki-link completion: partial query in, candidate notes
/// out. Ranking happens on this side.
pub type LinkSuggestionProvider =
    Rc<dyn Fn(String) -> Pin<Box<dyn Future<Output = Vec<LinkSuggestion>>>>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EditorTheme {
    Light,
    #[default]
    Dark,
    Monochrome,
    Solarized,
    Ocean,
}

impl EditorTheme {
    pub fn class(self) -> &'static str {
        match self {
            EditorTheme::Light => "theme-light",
            EditorTheme::Dark => "theme-dark",
            EditorTheme::Monochrome => "theme-monochrome",
            EditorTheme::Solarized => "theme-solarized",
            EditorTheme::Ocean => "theme-ocean",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionOption {
    pub label: String,
    pub detail: String,
    pub insert: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct CompletionMenu {
    options: Vec<CompletionOption>,
    selected: usize,
    replace_from: usize,
}

pub(crate) fn callout_options(query: &str) -> Vec<CompletionOption> {
    rank_callouts(query)
        .into_iter()
        .map(|kind| CompletionOption {
            label: kind.as_str().to_string(),
            detail: kind.icon().to_string(),
            insert: callout_insertion(kind),
        })
        .collect()
}

pub(crate) fn link_options(links: &[LinkSuggestion], query: &str) -> Vec<CompletionOption> {
    rank_links(links, query)
        .into_iter()
        .map(|link| CompletionOption {
            label: link.title.clone(),
            detail: link.url.clone(),
            insert: wiki_link_insertion(&link),
        })
        .collect()
}

/// Plain-text note editor with wiki-link and callout autocompletion.
#[component]
pub fn NoteEditor(
    #[prop(optional, into)] initial: String,
    #[prop(optional, into)] on_change: Option<Callback<String>>,
    #[prop(optional, into)] suggestions: Option<LinkSuggestionProvider>,
    #[prop(optional, into)] theme: Option<EditorTheme>,
) -> impl IntoView {
    let snapshot = RwSignal::new(EditorSnapshot::new(initial));
    let menu = RwSignal::new(None::<CompletionMenu>);
    let provider = StoredValue::new_local(suggestions);
    let request_seq = StoredValue::new(0u64);
    let textarea_ref = NodeRef::<leptos::html::Textarea>::new();
    let theme = theme.unwrap_or_default();

    let refresh = move || {
        let snap = snapshot.get_untracked();
        let Some(ctx) = completion_context(&snap.text, snap.selection.start) else {
            menu.set(None);
            return;
        };
        match ctx.kind {
            CompletionKind::Callout => {
                let options = callout_options(&ctx.query);
                menu.set((!options.is_empty()).then_some(CompletionMenu {
                    options,
                    selected: 0,
                    replace_from: ctx.replace_from,
                }));
            }
            CompletionKind::WikiLink => {
                let Some(provider) = provider.get_value() else {
                    menu.set(None);
                    return;
                };
                let seq = request_seq.get_value() + 1;
                request_seq.set_value(seq);
                let query = ctx.query.clone();
                let replace_from = ctx.replace_from;
                spawn_local(async move {
                    let links = provider(query.clone()).await;
                    // a newer keystroke owns the menu now
                    if request_seq.try_get_value() != Some(seq) {
                        return;
                    }
                    let options = link_options(&links, &query);
                    menu.try_set((!options.is_empty()).then_some(CompletionMenu {
                        options,
                        selected: 0,
                        replace_from,
                    }));
                });
            }
        }
    };

    let apply = move |option: CompletionOption, replace_from: usize| {
        snapshot.update(|snap| {
            let transaction = completion_transaction(snap, replace_from, &option.insert);
            if let Err(err) = snap.apply_transaction(transaction) {
                leptos::logging::warn!("completion was not applied: {err:?}");
            }
        });
        menu.set(None);

        let snap = snapshot.get_untracked();
        if let Some(callback) = on_change {
            callback.run(snap.text.clone());
        }
        let caret = utf16_offset_from_byte(&snap.text, snap.selection.start) as u32;
        request_animation_frame(move || {
            if let Some(ta) = textarea_ref.get_untracked() {
                let _ = ta.focus();
                let _ = ta.set_selection_range(caret, caret);
            }
        });
    };

    let on_input = move |ev: leptos::ev::Event| {
        let ta = event_target::<web_sys::HtmlTextAreaElement>(&ev);
        let value = ta.value();
        let cursor_utf16 = ta.selection_start().ok().flatten().unwrap_or(0) as usize;
        let cursor = byte_offset_from_utf16(&value, cursor_utf16);
        snapshot.update(|snap| {
            snap.replace_from_input(value.clone(), Selection::cursor(cursor));
        });
        if let Some(callback) = on_change {
            callback.run(value);
        }
        refresh();
    };

    let sync_selection = move |_| {
        if let Some(ta) = textarea_ref.get_untracked() {
            let cursor_utf16 = ta.selection_start().ok().flatten().unwrap_or(0) as usize;
            snapshot.update(|snap| {
                let cursor = byte_offset_from_utf16(&snap.text, cursor_utf16);
                snap.set_selection(Selection::cursor(cursor));
            });
            refresh();
        }
    };

    let on_keydown = move |ev: leptos::ev::KeyboardEvent| {
        let Some(current) = menu.get_untracked() else {
            return;
        };
        match ev.key().as_str() {
            "ArrowDown" => {
                ev.prevent_default();
                menu.update(|m| {
                    if let Some(m) = m {
                        m.selected = (m.selected + 1) % m.options.len();
                    }
                });
            }
            "ArrowUp" => {
                ev.prevent_default();
                menu.update(|m| {
                    if let Some(m) = m {
                        m.selected = (m.selected + m.options.len() - 1) % m.options.len();
                    }
                });
            }
            "Enter" | "Tab" => {
                ev.prevent_default();
                if let Some(option) = current.options.get(current.selected) {
                    apply(option.clone(), current.replace_from);
                }
            }
            "Escape" => {
                ev.prevent_default();
                menu.set(None);
            }
            _ => {}
        }
    };

    view! {
        <div class=format!("note-editor {}", theme.class())>
            <textarea
                class="note-editor-input"
                node_ref=textarea_ref
                prop:value=move || snapshot.get().text
                on:input=on_input
                on:keydown=on_keydown
                on:click=sync_selection
                spellcheck="false"
            ></textarea>
            {move || {
                menu.get()
                    .map(|m| {
                        let replace_from = m.replace_from;
                        let selected = m.selected;
                        view! {
                            <ul class="completion-menu">
                                {m
                                    .options
                                    .into_iter()
                                    .enumerate()
                                    .map(|(i, option)| {
                                        let applied = option.clone();
                                        view! {
                                            <li
                                                class="completion-option"
                                                class:selected={i == selected}
                                                on:mousedown=move |ev: leptos::ev::MouseEvent| {
                                                    ev.prevent_default();
                                                    apply(applied.clone(), replace_from);
                                                }
                                            >
                                                <span class="completion-label">{option.label}</span>
                                                <span class="completion-detail">{option.detail}</span>
                                            </li>
                                        }
                                            .into_any()
                                    })
                                    .collect::<Vec<_>>()}
                            </ul>
                        }
                            .into_any()
                    })
            }}
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::CalloutKind;

    #[test]
    fn theme_classes_are_distinct() {
        let themes = [
            EditorTheme::Light,
            EditorTheme::Dark,
            EditorTheme::Monochrome,
            EditorTheme::Solarized,
            EditorTheme::Ocean,
        ];
        for (i, a) in themes.iter().enumerate() {
            for b in &themes[i + 1..] {
                assert_ne!(a.class(), b.class());
            }
        }
        assert_eq!(EditorTheme::default(), EditorTheme::Dark);
    }

    #[test]
    fn callout_options_carry_the_insert_text() {
        let options = callout_options("warn");
        assert_eq!(options[0].label, "warning");
        assert_eq!(options[0].insert, "warning ");
        assert_eq!(options[0].detail, CalloutKind::Warning.icon());
    }

    #[test]
    fn link_options_rank_and_format_insertions() {
        let links = vec![
            LinkSuggestion::new("Home", "http://x/home"),
            LinkSuggestion::new("zzz", "http://x/zzz"),
        ];
        let options = link_options(&links, "ho");
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].label, "Home");
        assert_eq!(options[0].insert, "Home]](http://x/home)");
    }
}
