use crate::data::loader::load_data;
use crate::render::delay::delayed;
use crate::render::node::{Element, Node, component, el, fragment, suspense};

pub const COUNTER_CLASS: &str = "px-10 py-2 bg-gray-100";

const SIDEBAR_HINT: &str = "Try clicking the counter even when the main content is still loading!";

/// Button whose count the client bundle increments.
pub fn counter() -> Node {
    el("button").class(COUNTER_CLASS).attr("data-counter", "").child("0").into()
}

fn sidebar(hint: bool) -> Element {
    let aside = el("aside").child(el("h1").child("This is a sidebar"));
    let aside = if hint { aside.child(el("p").child(SIDEBAR_HINT)) } else { aside };
    aside.child(counter())
}

fn layout(hint: bool, main: Node) -> Node {
    el("article")
        .class("flex w-[100vw]")
        .child(sidebar(hint))
        .child(el("main").class("p-4 flex-1").child(main))
        .into()
}

/// Enough leading text for Safari to start rendering a streamed document.
pub fn safari_padding() -> Node {
    fragment([
        el("p").child(
            "This string is for triggering streaming in Safari. Does that sound weird? \
             Yes it does indeed.",
        ),
        el("p").child(
            "Safari needs enough contents to be displayed to enable streaming render. \
             The exact content size threshold is unknown, but this is enough.",
        ),
    ])
}

/// Reads `key` and renders `children` with the value, preceded by the
/// key's cache-sync instruction when this is its first appearance.
pub fn data_consumer<F>(key: &'static str, children: F) -> Node
where
    F: Fn(Node) -> Node + Send + Sync + 'static,
{
    component("DataConsumer", move |scope| {
        Ok(load_data(scope, key)?.map(|loaded| {
            let value = el("span").attr("data-key", key).child(loaded.value.as_str()).into();
            fragment([loaded.sync_script(), children(value)])
        }))
    })
}

pub fn basic() -> Node {
    layout(false, suspense("Loading...", delayed("basic", 3000, "3000ms delayed content")))
}

pub fn nested() -> Node {
    let inner = delayed(
        "nested-inner",
        1500,
        fragment([el("p").child("3000ms + 1500ms delayed content").into(), counter()]),
    );
    let outer = delayed(
        "nested-outer",
        3000,
        fragment([
            el("p").child("3000ms delayed content").into(),
            counter(),
            suspense("Nested Loading...", inner),
        ]),
    );
    layout(false, suspense("Loading...", outer))
}

pub fn basic_data() -> Node {
    let content = fragment([data_consumer("foobar", |value| value), counter()]);
    fragment([safari_padding(), layout(true, suspense("Loading...", content))])
}

pub fn nested_data() -> Node {
    let content = data_consumer("foobar", |value| {
        let nested = data_consumer("fizzbuzz", |value| {
            el("p").child("Nested Data: ").child(value).child(counter()).into()
        });
        fragment([
            el("p")
                .child("Data: ")
                .child(value)
                .child(el("br"))
                .child("Try clicking the counter even when the other Suspense is still loading!")
                .child(el("br"))
                .child(counter())
                .into(),
            suspense("Nested Loading...", nested),
        ])
    });
    fragment([safari_padding(), layout(true, suspense("Loading...", content))])
}

/// Same tree as [`nested_data`], but values only reach the client in one
/// payload at the end of the body, so the client refetches and the
/// timestamps visibly change after hydration.
pub fn non_streamed_nested_data() -> Node {
    let content = data_consumer("foobar", |value| {
        let nested = data_consumer("fizzbuzz", |value| {
            el("p").child("Nested Data: ").child(value).child(counter()).into()
        });
        fragment([
            el("p")
                .child("Watch the numeric part of the following data changing after hydration...")
                .child(el("br"))
                .child(
                    "(It's because the data cache is not streamed in this example, \
                     but passed at the end of the body)",
                )
                .into(),
            el("p").child("Data: ").child(value).child(counter()).into(),
            suspense("Nested Loading...", nested),
        ])
    });
    fragment([safari_padding(), layout(false, suspense("Loading...", content))])
}
