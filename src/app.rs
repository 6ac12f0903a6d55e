use std::rc::Rc;

use leptos::prelude::*;

use crate::editor::{EditorTheme, LinkSuggestionProvider, NoteEditor};
use crate::fuzzy::LinkSuggestion;
use crate::renderer::{NoteRenderer, PreviewContentProvider};

const SAMPLE_NOTE: &str = r#"# Verdant

A note with the extended syntax. Links like [Ada Lovelace](wiki:Ada Lovelace)
preview Wikipedia on click, and [this paper](doi:10.1145/3290364) pulls its
citation from the DOI. Internal links come from completion: type `[[` in the
editor. [[Welcome]](note://welcome) points at another note.

::info Callouts start a line with a double colon. Type `::` to complete one.

Some inline extras: a spoiler ||the butler did it||, a quick aside ?[only
rendered on hover], and a forced break here{\n}on its own line.

## Code

```rust
fn main() {
    println!("hello");
}
```

## Table

| Syntax | Marker |
| ------ | ------ |
| Aside | `?[text]` |
| Callout | `::type text` |

- [x] tables
- [ ] syntax reference
"#;

fn demo_links() -> Vec<LinkSuggestion> {
    vec![
        LinkSuggestion::new("Welcome", "note://welcome"),
        LinkSuggestion::new("Reading list", "note://reading-list"),
        LinkSuggestion::new("Weekly review", "note://weekly-review"),
        LinkSuggestion::new("Recipes", "note://recipes"),
    ]
}

/// Demo playground: the editor on the left feeds the renderer on the right.
#[component]
pub fn App() -> impl IntoView {
    let content = RwSignal::new(SAMPLE_NOTE.to_string());
    let on_change = Callback::new(move |text: String| content.set(text));

    let suggestions: LinkSuggestionProvider =
        Rc::new(|_query: String| Box::pin(async move { demo_links() }));

    let preview_content: PreviewContentProvider = Rc::new(|url: String| {
        Box::pin(async move {
            format!("### Linked note\n\nThe demo provider resolved `{url}` to this text.")
        })
    });

    let on_link_click = Callback::new(|url: String| {
        leptos::logging::log!("link clicked: {url}");
    });

    view! {
        <main class="app-layout">
            <section class="pane">
                <header class="pane-title">"Editor"</header>
                <NoteEditor
                    initial=SAMPLE_NOTE.to_string()
                    on_change=on_change
                    suggestions=suggestions
                    theme=EditorTheme::Dark
                />
            </section>
            <section class="pane">
                <header class="pane-title">"Preview"</header>
                <NoteRenderer
                    content=content
                    preview_content=preview_content
                    on_link_click=on_link_click
                />
            </section>
        </main>
    }
}
