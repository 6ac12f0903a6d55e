use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::OnceLock;
use std::time::Duration;

use leptos::leptos_dom::helpers::{set_timeout_with_handle, TimeoutHandle};
use leptos::prelude::*;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};
use regex::Regex;

use crate::popup::{Callout, CodeBlock, Greenlink, PreviewPopup, QuickAside, Spoiler};
use crate::preview::PreviewTarget;
use crate::syntax::{preprocess, CalloutKind};

pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Markdown provider for previews of links that are neither `wiki:` nor
/// `doi:`. The host resolves the url to note content.
pub type PreviewContentProvider = Rc<dyn Fn(String) -> Pin<Box<dyn Future<Output = String>>>>;

/// Clipboard override for code-block copy buttons.
pub type CopyHandler = Rc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()>>>>;

/// Caller-supplied behavior, handed down to the interactive components
/// through context. Every hook is optional and degrades silently.
#[derive(Clone, Default)]
pub struct RenderHooks {
    pub preview_content: Option<PreviewContentProvider>,
    pub on_copy: Option<CopyHandler>,
    pub on_link_click: Option<Callback<String>>,
    pub callout_icon: Option<fn(CalloutKind) -> &'static str>,
}

/// Context handle for [`RenderHooks`]. The hooks hold `Rc` providers and
/// cannot cross the context boundary themselves, so they live in local
/// storage and only the arena handle is provided.
#[derive(Clone, Copy)]
pub(crate) struct RenderHooksHandle(StoredValue<RenderHooks, LocalStorage>);

impl RenderHooksHandle {
    pub(crate) fn get(self) -> RenderHooks {
        self.0.try_get_value().unwrap_or_default()
    }
}

/// Signal a greenlink writes to when it wants a preview popup opened.
#[derive(Clone, Copy)]
pub struct PreviewRequest(pub RwSignal<Option<String>>);

/// Present inside a popup's own render tree; greenlinks check it to open in
/// a new tab instead of stacking popups.
#[derive(Clone, Copy)]
pub struct NestedRender(pub bool);

/// Renders note text as markdown extended with the custom inline syntax.
/// Input is debounced so rapid editor keystrokes do not re-render per key.
#[component]
pub fn NoteRenderer(
    #[prop(into)] content: Signal<String>,
    #[prop(optional, into)] debounce_ms: Option<u64>,
    #[prop(optional, into)] preview_content: Option<PreviewContentProvider>,
    #[prop(optional, into)] on_copy: Option<CopyHandler>,
    #[prop(optional, into)] on_link_click: Option<Callback<String>>,
    #[prop(optional, into)] callout_icon: Option<fn(CalloutKind) -> &'static str>,
) -> impl IntoView {
    let hooks = StoredValue::new_local(RenderHooks {
        preview_content,
        on_copy,
        on_link_click,
        callout_icon,
    });
    provide_context(RenderHooksHandle(hooks));

    let preview_url = RwSignal::new(None::<String>);
    provide_context(PreviewRequest(preview_url));

    let debounce = debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS);
    let debounced = RwSignal::new(content.get_untracked());
    let pending = StoredValue::new_local(None::<TimeoutHandle>);

    Effect::new(move |_| {
        let next = content.get();
        if let Some(handle) = pending.get_value() {
            handle.clear();
        }
        let scheduled = set_timeout_with_handle(
            move || {
                debounced.try_set(next);
            },
            Duration::from_millis(debounce),
        );
        if let Ok(handle) = scheduled {
            pending.set_value(Some(handle));
        }
    });

    view! {
        <div class="note-renderer">
            {move || markdown_view(&preprocess(&debounced.get()))}
            {move || {
                preview_url.get().map(|url| {
                    let on_close = Callback::new(move |_: ()| preview_url.set(None));
                    view! { <PreviewPopup url=url on_close=on_close/> }.into_any()
                })
            }}
        </div>
    }
}

fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_MATH);
    options
}

/// Renders preprocessed text into a view tree.
pub(crate) fn markdown_view(source: &str) -> AnyView {
    build_views(source, false).into_any()
}

/// Like [`markdown_view`] but without `<p>` wrappers at the top level, for
/// content that sits inside another element (spoiler bodies, tooltips).
pub(crate) fn markdown_inline_view(source: &str) -> AnyView {
    build_views(source, true).into_any()
}

fn build_views(source: &str, inline: bool) -> Vec<AnyView> {
    let parser = Parser::new_ext(source, markdown_options());
    let mut builder = TreeBuilder::new(inline);
    for event in parser {
        builder.handle(event);
    }
    builder.finish()
}

#[derive(Clone, Debug, PartialEq)]
enum CustomElement {
    Greenlink { href: String },
    Spoiler,
    Callout { kind: CalloutKind },
    QuickAside { content: String },
}

#[derive(Debug, PartialEq)]
enum CustomMarkup {
    /// A complete `<tag …>content</tag>` in one chunk, as html blocks
    /// deliver it.
    Element(CustomElement, String),
    Open(CustomElement),
    Close(String),
    LineBreak,
}

/// Recognizes the pseudo-element tags the preprocessor emits. Anything else
/// returns `None` and falls through to the raw-HTML path.
fn parse_custom_markup(html: &str) -> Option<CustomMarkup> {
    static RE_FULL: OnceLock<Regex> = OnceLock::new();
    static RE_OPEN: OnceLock<Regex> = OnceLock::new();
    static RE_CLOSE: OnceLock<Regex> = OnceLock::new();

    let re_full = RE_FULL.get_or_init(|| {
        Regex::new(
            r"(?s)^<(greenlink|spoiler|callout|quick-aside)(\s[^>]*)?>(.*)</(greenlink|spoiler|callout|quick-aside)>$",
        )
        .unwrap()
    });
    let re_open = RE_OPEN
        .get_or_init(|| Regex::new(r"^<(greenlink|spoiler|callout|quick-aside)(\s[^>]*)?>$").unwrap());
    let re_close =
        RE_CLOSE.get_or_init(|| Regex::new(r"^</(greenlink|spoiler|callout|quick-aside)>$").unwrap());

    let html = html.trim();
    if matches!(html, "<br>" | "<br/>" | "<br />") {
        return Some(CustomMarkup::LineBreak);
    }
    if let Some(cap) = re_full.captures(html) {
        if cap[1] == cap[4] {
            let element = element_from(&cap[1], cap.get(2).map_or("", |m| m.as_str()));
            return Some(CustomMarkup::Element(element, cap[3].to_string()));
        }
    }
    if let Some(cap) = re_open.captures(html) {
        let element = element_from(&cap[1], cap.get(2).map_or("", |m| m.as_str()));
        return Some(CustomMarkup::Open(element));
    }
    if let Some(cap) = re_close.captures(html) {
        return Some(CustomMarkup::Close(cap[1].to_string()));
    }
    None
}

fn element_from(name: &str, attrs: &str) -> CustomElement {
    match name {
        "greenlink" => CustomElement::Greenlink {
            href: attr_value(attrs, "href").unwrap_or_default(),
        },
        "spoiler" => CustomElement::Spoiler,
        "callout" => CustomElement::Callout {
            kind: attr_value(attrs, "type")
                .as_deref()
                .and_then(CalloutKind::parse)
                .unwrap_or(CalloutKind::Info),
        },
        _ => CustomElement::QuickAside {
            content: attr_value(attrs, "content").unwrap_or_default(),
        },
    }
}

fn attr_value(attrs: &str, name: &str) -> Option<String> {
    static RE_ATTR: OnceLock<Regex> = OnceLock::new();
    let re = RE_ATTR.get_or_init(|| Regex::new(r#"([a-z-]+)="([^"]*)""#).unwrap());
    re.captures_iter(attrs)
        .find(|cap| &cap[1] == name)
        .map(|cap| cap[2].to_string())
}

pub(crate) fn slugify(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

enum Frame {
    Root,
    /// Children splice into the parent with no wrapper.
    Fragment,
    Paragraph,
    Heading(HeadingLevel),
    BlockQuote,
    CodeBlock { lang: String },
    List(Option<u64>),
    Item,
    FootnoteDefinition(String),
    Table,
    TableHead,
    TableRow,
    TableCell { header: bool },
    Emphasis,
    Strong,
    Strikethrough,
    Link { href: String, title: String },
    Image { src: String, title: String },
    HtmlBlock,
    Custom(CustomElement),
}

struct FrameState {
    frame: Frame,
    children: Vec<AnyView>,
    /// Plain text seen inside the frame, for heading slugs, code sources,
    /// image alts and greenlink labels.
    text: String,
    /// Raw html seen inside the frame, for custom-tag interiors and the
    /// unknown-HTML fallback.
    html: String,
}

impl FrameState {
    fn new(frame: Frame) -> Self {
        Self {
            frame,
            children: Vec::new(),
            text: String::new(),
            html: String::new(),
        }
    }
}

struct TreeBuilder {
    stack: Vec<FrameState>,
    inline: bool,
}

impl TreeBuilder {
    fn new(inline: bool) -> Self {
        Self {
            stack: vec![FrameState::new(Frame::Root)],
            inline,
        }
    }

    fn top(&mut self) -> &mut FrameState {
        self.stack.last_mut().unwrap_or_else(|| unreachable!())
    }

    fn push(&mut self, frame: Frame) {
        self.stack.push(FrameState::new(frame));
    }

    fn add_view(&mut self, view: AnyView) {
        self.top().children.push(view);
    }

    fn add_text(&mut self, text: &str) {
        let top = self.top();
        top.text.push_str(text);
        top.children.push(text.to_string().into_any());
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => self.add_text(&text),
            Event::Code(code) => {
                let code = code.to_string();
                self.top().text.push_str(&code);
                self.add_view(view! { <code class="inline-code">{code}</code> }.into_any());
            }
            Event::InlineMath(src) => {
                let src = src.to_string();
                let tex = src.clone();
                self.add_view(
                    view! { <span class="math-inline" data-math=tex>{src}</span> }.into_any(),
                );
            }
            Event::DisplayMath(src) => {
                let src = src.to_string();
                let tex = src.clone();
                self.add_view(
                    view! { <div class="math-display" data-math=tex>{src}</div> }.into_any(),
                );
            }
            Event::Html(html) | Event::InlineHtml(html) => self.handle_html(&html),
            Event::FootnoteReference(name) => {
                let href = format!("#fn-{}", slugify(&name));
                let name = name.to_string();
                self.add_view(
                    view! { <sup class="footnote-reference"><a href=href>{name}</a></sup> }
                        .into_any(),
                );
            }
            Event::SoftBreak => self.add_text(" "),
            Event::HardBreak => self.add_view(view! { <br/> }.into_any()),
            Event::Rule => self.add_view(view! { <hr/> }.into_any()),
            Event::TaskListMarker(checked) => self.add_view(
                view! { <input type="checkbox" disabled=true checked=checked/> }.into_any(),
            ),
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                if self.inline && self.stack.len() == 1 {
                    self.push(Frame::Fragment);
                } else {
                    self.push(Frame::Paragraph);
                }
            }
            Tag::Heading { level, .. } => self.push(Frame::Heading(level)),
            Tag::BlockQuote(_) => self.push(Frame::BlockQuote),
            Tag::CodeBlock(kind) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => lang.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.push(Frame::CodeBlock { lang });
            }
            Tag::List(start) => self.push(Frame::List(start)),
            Tag::Item => self.push(Frame::Item),
            Tag::FootnoteDefinition(name) => {
                self.push(Frame::FootnoteDefinition(name.to_string()))
            }
            Tag::Table(_) => self.push(Frame::Table),
            Tag::TableHead => self.push(Frame::TableHead),
            Tag::TableRow => self.push(Frame::TableRow),
            Tag::TableCell => {
                let header = self
                    .stack
                    .iter()
                    .any(|state| matches!(state.frame, Frame::TableHead));
                self.push(Frame::TableCell { header });
            }
            Tag::Emphasis => self.push(Frame::Emphasis),
            Tag::Strong => self.push(Frame::Strong),
            Tag::Strikethrough => self.push(Frame::Strikethrough),
            Tag::Link {
                dest_url, title, ..
            } => self.push(Frame::Link {
                href: dest_url.to_string(),
                title: title.to_string(),
            }),
            Tag::Image {
                dest_url, title, ..
            } => self.push(Frame::Image {
                src: dest_url.to_string(),
                title: title.to_string(),
            }),
            Tag::HtmlBlock => self.push(Frame::HtmlBlock),
            _ => self.push(Frame::Fragment),
        }
    }

    fn end(&mut self) {
        // A custom tag whose close marker never arrived still nests inside
        // the enclosing markdown element.
        while self.stack.len() > 1 && matches!(self.top().frame, Frame::Custom(_)) {
            self.close_top();
        }
        if self.stack.len() > 1 {
            self.close_top();
        }
    }

    fn close_custom(&mut self) {
        while self.stack.len() > 1 {
            let was_custom = matches!(self.top().frame, Frame::Custom(_));
            self.close_top();
            if was_custom {
                return;
            }
        }
    }

    fn handle_html(&mut self, html: &str) {
        let trimmed = html.trim();
        if trimmed.is_empty() {
            return;
        }
        match parse_custom_markup(trimmed) {
            Some(CustomMarkup::Element(element, content)) => {
                let view = custom_element_view(element, Vec::new(), content.trim(), "");
                self.add_view(view);
            }
            Some(CustomMarkup::Open(element)) => self.push(Frame::Custom(element)),
            Some(CustomMarkup::Close(_)) => {
                if self
                    .stack
                    .iter()
                    .any(|state| matches!(state.frame, Frame::Custom(_)))
                {
                    self.close_custom();
                }
            }
            Some(CustomMarkup::LineBreak) => self.add_view(view! { <br/> }.into_any()),
            None => {
                let collects_raw =
                    matches!(self.top().frame, Frame::Custom(_) | Frame::HtmlBlock);
                if collects_raw {
                    self.top().html.push_str(html);
                } else {
                    self.add_view(view! { <span inner_html=html.to_string()></span> }.into_any());
                }
            }
        }
    }

    fn close_top(&mut self) {
        let FrameState {
            frame,
            mut children,
            text,
            html,
        } = match self.stack.pop() {
            Some(state) => state,
            None => return,
        };

        let view: Option<AnyView> = match frame {
            Frame::Root => None,
            Frame::Fragment => {
                let top = self.top();
                top.children.append(&mut children);
                top.text.push_str(&text);
                return;
            }
            Frame::Paragraph => Some(view! { <p>{children}</p> }.into_any()),
            Frame::Heading(level) => Some(heading_view(level, slugify(&text), children)),
            Frame::BlockQuote => Some(view! { <blockquote>{children}</blockquote> }.into_any()),
            Frame::CodeBlock { lang } => {
                Some(view! { <CodeBlock code=text.clone() language=lang/> }.into_any())
            }
            Frame::List(Some(start)) => {
                Some(view! { <ol start=start.to_string()>{children}</ol> }.into_any())
            }
            Frame::List(None) => Some(view! { <ul>{children}</ul> }.into_any()),
            Frame::Item => Some(view! { <li>{children}</li> }.into_any()),
            Frame::FootnoteDefinition(name) => {
                let id = format!("fn-{}", slugify(&name));
                let label = name.clone();
                Some(
                    view! {
                        <div class="footnote-definition" id=id>
                            <sup class="footnote-label">{label}</sup>
                            {children}
                        </div>
                    }
                    .into_any(),
                )
            }
            Frame::Table => {
                let head = if children.is_empty() {
                    None
                } else {
                    Some(children.remove(0))
                };
                Some(view! { <table>{head}<tbody>{children}</tbody></table> }.into_any())
            }
            Frame::TableHead => Some(view! { <thead><tr>{children}</tr></thead> }.into_any()),
            Frame::TableRow => Some(view! { <tr>{children}</tr> }.into_any()),
            Frame::TableCell { header: true } => Some(view! { <th>{children}</th> }.into_any()),
            Frame::TableCell { header: false } => Some(view! { <td>{children}</td> }.into_any()),
            Frame::Emphasis => Some(view! { <em>{children}</em> }.into_any()),
            Frame::Strong => Some(view! { <strong>{children}</strong> }.into_any()),
            Frame::Strikethrough => Some(view! { <del>{children}</del> }.into_any()),
            Frame::Link { href, title } => {
                let title = (!title.is_empty()).then_some(title);
                Some(view! { <a href=href title=title>{children}</a> }.into_any())
            }
            Frame::Image { src, title } => {
                let title = (!title.is_empty()).then_some(title);
                Some(view! { <img src=src alt=text.clone() title=title/> }.into_any())
            }
            Frame::HtmlBlock => {
                let raw = html.trim().to_string();
                (!raw.is_empty())
                    .then(|| view! { <div inner_html=raw></div> }.into_any())
            }
            Frame::Custom(element) => Some(custom_element_view(element, children, &text, &html)),
        };

        let top = self.top();
        if let Some(view) = view {
            top.children.push(view);
        }
        top.text.push_str(&text);
    }

    fn finish(mut self) -> Vec<AnyView> {
        while self.stack.len() > 1 {
            self.close_top();
        }
        self.stack
            .pop()
            .map(|state| state.children)
            .unwrap_or_default()
    }
}

fn custom_element_view(
    element: CustomElement,
    children: Vec<AnyView>,
    text: &str,
    html: &str,
) -> AnyView {
    match element {
        CustomElement::Greenlink { href } => {
            let label = if !text.trim().is_empty() {
                text.trim().to_string()
            } else {
                html.trim().to_string()
            };
            view! { <Greenlink href=href label=label/> }.into_any()
        }
        CustomElement::Spoiler => {
            view! { <Spoiler body=custom_body(children, text, html)/> }.into_any()
        }
        CustomElement::Callout { kind } => {
            view! { <Callout kind=kind body=custom_body(children, text, html)/> }.into_any()
        }
        CustomElement::QuickAside { content } => {
            view! { <QuickAside content=content/> }.into_any()
        }
    }
}

/// Body of a custom element: views already parsed inline, plus any raw text
/// that arrived inside an html block, re-rendered as markdown.
fn custom_body(mut children: Vec<AnyView>, text: &str, html: &str) -> AnyView {
    if children.is_empty() && !text.trim().is_empty() {
        children.extend(build_views(text.trim(), true));
    }
    let raw = html.trim();
    if !raw.is_empty() {
        children.extend(build_views(raw, true));
    }
    children.into_any()
}

fn heading_view(level: HeadingLevel, slug: String, children: Vec<AnyView>) -> AnyView {
    let anchor =
        view! { <a class="heading-anchor" href=format!("#{slug}")>"#"</a> };
    match level {
        HeadingLevel::H1 => view! { <h1 id=slug>{children}{anchor}</h1> }.into_any(),
        HeadingLevel::H2 => view! { <h2 id=slug>{children}{anchor}</h2> }.into_any(),
        HeadingLevel::H3 => view! { <h3 id=slug>{children}{anchor}</h3> }.into_any(),
        HeadingLevel::H4 => view! { <h4 id=slug>{children}{anchor}</h4> }.into_any(),
        HeadingLevel::H5 => view! { <h5 id=slug>{children}{anchor}</h5> }.into_any(),
        HeadingLevel::H6 => view! { <h6 id=slug>{children}{anchor}</h6> }.into_any(),
    }
}

/// Resolves a greenlink target for plain-browser opening.
pub(crate) fn external_href(url: &str) -> String {
    PreviewTarget::classify(url).external_url()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_open_tags_with_attributes() {
        let parsed = parse_custom_markup(r#"<greenlink href="wiki:Rust">"#);
        assert_eq!(
            parsed,
            Some(CustomMarkup::Open(CustomElement::Greenlink {
                href: "wiki:Rust".to_string()
            }))
        );

        let parsed = parse_custom_markup(r#"<callout type="warning">"#);
        assert_eq!(
            parsed,
            Some(CustomMarkup::Open(CustomElement::Callout {
                kind: CalloutKind::Warning
            }))
        );
    }

    #[test]
    fn recognizes_close_tags_and_breaks() {
        assert_eq!(
            parse_custom_markup("</spoiler>"),
            Some(CustomMarkup::Close("spoiler".to_string()))
        );
        assert_eq!(parse_custom_markup("<br>"), Some(CustomMarkup::LineBreak));
    }

    #[test]
    fn recognizes_complete_elements() {
        let parsed = parse_custom_markup(r#"<callout type="error">nope</callout>"#);
        assert_eq!(
            parsed,
            Some(CustomMarkup::Element(
                CustomElement::Callout {
                    kind: CalloutKind::Error
                },
                "nope".to_string()
            ))
        );
    }

    #[test]
    fn unknown_callout_type_defaults_to_info() {
        let parsed = parse_custom_markup(r#"<callout type="danger">"#);
        assert_eq!(
            parsed,
            Some(CustomMarkup::Open(CustomElement::Callout {
                kind: CalloutKind::Info
            }))
        );
    }

    #[test]
    fn unrecognized_html_is_not_custom_markup() {
        assert_eq!(parse_custom_markup("<video controls>"), None);
        assert_eq!(parse_custom_markup("plain text"), None);
    }

    #[test]
    fn quick_aside_carries_its_content_attribute() {
        let parsed = parse_custom_markup(r#"<quick-aside content="a note">?</quick-aside>"#);
        assert_eq!(
            parsed,
            Some(CustomMarkup::Element(
                CustomElement::QuickAside {
                    content: "a note".to_string()
                },
                "?".to_string()
            ))
        );
    }

    #[test]
    fn slugifies_heading_text() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Already--dashed_text  "), "already-dashed-text");
        assert_eq!(slugify("Crème brûlée!"), "crème-brûlée");
    }

    #[test]
    fn markdown_options_enable_the_extensions() {
        let options = markdown_options();
        assert!(options.contains(Options::ENABLE_TABLES));
        assert!(options.contains(Options::ENABLE_FOOTNOTES));
        assert!(options.contains(Options::ENABLE_STRIKETHROUGH));
        assert!(options.contains(Options::ENABLE_TASKLISTS));
        assert!(options.contains(Options::ENABLE_MATH));
    }
}
