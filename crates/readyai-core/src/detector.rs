//! Per-site "generation in progress" rules.
//!
//! Each detection mode maps to one pure rule over the search roots. Only
//! visible, enabled elements count. A rule that panics is treated as
//! "not generating".

use crate::dom::{is_enabled_button_like, is_visible, query_all, Dom, ElementQuery};
use crate::roots::SearchRoots;
use once_cell::sync::Lazy;
use readyai_types::DetectionMode;
use regex::Regex;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

static RUN_STOP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\bstop\b|\bcancel\b|중지|취소)").expect("valid regex"));

static RUN_ICON_STOP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\bstop\b|stop_circle|stop_circle_filled|cancel)").expect("valid regex"));

static ICON_STOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\bstop\b|stop_circle|stop_circle_filled|\bcancel\b)").expect("valid regex")
});

static GENERIC_STOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\bstop\b|\bcancel\b|\babort\b|중지|취소)").expect("valid regex")
});

/// Where a rule looks.
struct Scope<'a, D: Dom + ?Sized> {
    dom: &'a D,
    roots: &'a SearchRoots<D::Node>,
    deep: bool,
}

impl<D: Dom + ?Sized> Scope<'_, D> {
    /// Matches across every known root when deep, the document otherwise.
    fn select(&self, query: &ElementQuery) -> Vec<D::Node> {
        if self.deep && !self.roots.is_empty() {
            self.roots
                .roots()
                .iter()
                .flat_map(|root| query_all(self.dom, root, query))
                .collect()
        } else {
            let document = self
                .roots
                .document()
                .cloned()
                .unwrap_or_else(|| self.dom.document());
            query_all(self.dom, &document, query)
        }
    }

    /// Visible and not disabled.
    fn is_live(&self, node: &D::Node) -> bool {
        is_visible(self.dom, node) && is_enabled_button_like(self.dom, node)
    }

    fn any_live(&self, query: &ElementQuery) -> bool {
        self.select(query).iter().any(|n| self.is_live(n))
    }

    fn attr(&self, node: &D::Node, name: &str) -> String {
        self.dom
            .attribute(node, name)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    fn icon_haystack(&self, node: &D::Node) -> String {
        let text = self.dom.text(node).to_lowercase();
        let font_icon = self.attr(node, "fonticon").to_lowercase();
        let svg_icon = self.attr(node, "svgicon").to_lowercase();
        haystack(&[&text, &font_icon, &svg_icon])
    }
}

/// Space-joined, trimmed haystack of the given parts.
fn haystack(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Does this frame currently show a generation in progress?
pub fn detect<D: Dom + ?Sized>(mode: DetectionMode, dom: &D, roots: &SearchRoots<D::Node>) -> bool {
    let scope = Scope {
        dom,
        roots,
        deep: mode.uses_deep_search(),
    };
    let rule = rule_for::<D>(mode);
    match panic::catch_unwind(AssertUnwindSafe(|| rule(&scope))) {
        Ok(generating) => generating,
        Err(_) => {
            debug!(target: "readyai::detector", "Detection rule for {} panicked; treating as idle", mode);
            false
        }
    }
}

fn rule_for<D: Dom + ?Sized>(mode: DetectionMode) -> fn(&Scope<'_, D>) -> bool {
    match mode {
        DetectionMode::ChatGpt => chatgpt::<D>,
        DetectionMode::Gemini => gemini::<D>,
        DetectionMode::AiStudio => aistudio::<D>,
        DetectionMode::Claude => claude::<D>,
        DetectionMode::GenericStop => generic_stop::<D>,
    }
}

fn chatgpt<D: Dom + ?Sized>(scope: &Scope<'_, D>) -> bool {
    let query = ElementQuery::any().attr_eq("data-testid", "stop-button");
    scope
        .select(&query)
        .first()
        .is_some_and(|n| scope.is_live(n))
}

fn gemini<D: Dom + ?Sized>(scope: &Scope<'_, D>) -> bool {
    ["중지", "Stop", "stop"].into_iter().any(|label| {
        scope
            .select(&ElementQuery::any().attr_contains("aria-label", label))
            .iter()
            .any(|n| scope.is_live(n))
    })
}

fn aistudio<D: Dom + ?Sized>(scope: &Scope<'_, D>) -> bool {
    aistudio_stop_button(scope)
        || aistudio_run_button_relabelled(scope)
        || aistudio_stop_icon(scope)
        || aistudio_progress(scope)
        || scope.any_live(&ElementQuery::any().attr_eq("aria-busy", "true"))
}

fn aistudio_stop_button<D: Dom + ?Sized>(scope: &Scope<'_, D>) -> bool {
    let queries = [
        ElementQuery::tag("ms-stop-button"),
        ElementQuery::tag("button").attr_contains("aria-label", "Stop"),
        ElementQuery::tag("button").attr_contains("aria-label", "stop"),
        ElementQuery::tag("button").attr_contains("aria-label", "중지"),
        ElementQuery::tag("button").attr_contains("title", "Stop"),
        ElementQuery::tag("button").attr_contains("title", "중지"),
    ];
    queries.iter().any(|q| scope.any_live(q))
}

fn aistudio_run_button_relabelled<D: Dom + ?Sized>(scope: &Scope<'_, D>) -> bool {
    let queries = [
        ElementQuery::tag("button")
            .class("run-button")
            .inside(ElementQuery::tag("ms-run-button")),
        ElementQuery::tag("button")
            .attr_eq("type", "submit")
            .inside(ElementQuery::tag("ms-run-button")),
        ElementQuery::tag("button").class("run-button"),
        ElementQuery::tag("button").attr_eq("aria-label", "Run"),
        ElementQuery::tag("button").attr_contains("aria-label", "Run"),
    ];
    let icons = [
        ElementQuery::tag("mat-icon"),
        ElementQuery::any().class("material-symbols-outlined"),
    ];

    for query in &queries {
        for button in scope.select(query) {
            if !scope.is_live(&button) {
                continue;
            }
            let aria = scope.attr(&button, "aria-label");
            let title = scope.attr(&button, "title");
            let text = scope.dom.text(&button);
            let hay = haystack(&[&aria, &title, &text]);
            if !hay.is_empty() && RUN_STOP.is_match(&hay) {
                return true;
            }

            // Icon-only run buttons.
            let relabelled = icons
                .iter()
                .flat_map(|icon| query_all(scope.dom, &button, icon))
                .map(|icon| scope.icon_haystack(&icon))
                .any(|hay| !hay.is_empty() && RUN_ICON_STOP.is_match(&hay));
            if relabelled {
                return true;
            }
        }
    }
    false
}

fn aistudio_stop_icon<D: Dom + ?Sized>(scope: &Scope<'_, D>) -> bool {
    let button = || ElementQuery::tag("button");
    let symbols = || {
        ElementQuery::any()
            .class("material-symbols-outlined")
            .attr_not_contains("class", "keyboard")
    };
    let queries = [
        ElementQuery::tag("mat-icon").attr_eq("fonticon", "stop").inside(button()),
        ElementQuery::tag("mat-icon").attr_eq("fonticon", "stop_circle").inside(button()),
        ElementQuery::tag("mat-icon").attr_eq("fonticon", "stop"),
        ElementQuery::tag("mat-icon").attr_eq("fonticon", "stop_circle"),
        ElementQuery::tag("mat-icon").attr_contains("svgicon", "stop").inside(button()),
        ElementQuery::tag("mat-icon").attr_contains("svgicon", "stop"),
        symbols().inside(button()),
        symbols(),
        ElementQuery::tag("mat-icon").inside(button()),
        ElementQuery::tag("mat-icon"),
    ];

    // A stop icon on a disabled control is not a live stop button.
    let queries = queries.map(|q| q.not_inside(ElementQuery::any().disabled()));

    queries.iter().any(|query| {
        scope.select(query).iter().any(|icon| {
            if !scope.is_live(icon) {
                return false;
            }
            let hay = scope.icon_haystack(icon);
            !hay.is_empty() && ICON_STOP.is_match(&hay)
        })
    })
}

fn aistudio_progress<D: Dom + ?Sized>(scope: &Scope<'_, D>) -> bool {
    let queries = [
        ElementQuery::any().class("mat-progress-spinner"),
        ElementQuery::any().class("mat-mdc-progress-spinner"),
        ElementQuery::tag("mat-progress-spinner"),
        ElementQuery::tag("mat-spinner"),
        ElementQuery::any().class("mat-progress-bar"),
        ElementQuery::any().class("mat-mdc-progress-bar"),
        ElementQuery::tag("mat-progress-bar"),
    ];
    queries.iter().any(|q| scope.any_live(q))
}

fn claude<D: Dom + ?Sized>(scope: &Scope<'_, D>) -> bool {
    let queries = [
        ElementQuery::tag("button"),
        ElementQuery::tag("div").attr_eq("role", "button"),
    ];
    queries.iter().any(|query| {
        scope
            .select(query)
            .iter()
            .any(|n| scope.dom.text(n).contains("Stop") && scope.is_live(n))
    })
}

fn generic_stop<D: Dom + ?Sized>(scope: &Scope<'_, D>) -> bool {
    let queries = [
        ElementQuery::tag("button"),
        ElementQuery::any().attr_eq("role", "button"),
    ];
    queries.iter().any(|query| {
        scope.select(query).iter().any(|n| {
            if !scope.is_live(n) {
                return false;
            }
            let aria = scope.attr(n, "aria-label");
            let text = scope.dom.text(n);
            let hay = haystack(&[&aria, &text]);
            !hay.is_empty() && GENERIC_STOP.is_match(&hay)
        })
    })
}
