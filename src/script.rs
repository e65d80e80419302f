use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{info, warn};
use rquickjs::function::{Func, Opt};
use rquickjs::{CatchResultExt, Context, Ctx, Exception, Runtime};

use crate::css_parser::CssParser;
use crate::html_parser::HtmlParser;
use crate::node::{HtmlNode, NodeRef};
use crate::url::{Origin, Url};

const RUNTIME_JS: &str = include_str!("../assets/runtime.js");

/// State the host functions share with the owning tab. Handle tables map
/// nodes to monotonically assigned integers; the inverse side holds strong
/// references, so a handed-out handle never dangles while the tab lives.
pub struct JsShared {
    pub document: Option<NodeRef>,
    pub url: Url,
    pub allowed_origins: Option<Vec<Origin>>,
    pub needs_render: bool,
    node_to_handle: HashMap<*const RefCell<HtmlNode>, u32>,
    handle_to_node: Vec<NodeRef>,
}

impl JsShared {
    pub fn get_handle(&mut self, node: &NodeRef) -> u32 {
        let key = Rc::as_ptr(node);
        if let Some(&handle) = self.node_to_handle.get(&key) {
            return handle;
        }
        let handle = self.handle_to_node.len() as u32;
        self.node_to_handle.insert(key, handle);
        self.handle_to_node.push(node.clone());
        handle
    }

    fn node_for(&self, handle: u32) -> Option<NodeRef> {
        self.handle_to_node.get(handle as usize).cloned()
    }
}

/// One script engine per tab load. Host functions are bound as globals and
/// the runtime library is evaluated before any page script runs.
pub struct JsContext {
    _runtime: Runtime,
    context: Context,
    pub shared: Rc<RefCell<JsShared>>,
}

impl JsContext {
    pub fn new(url: Url, allowed_origins: Option<Vec<Origin>>) -> Result<JsContext, rquickjs::Error> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;
        let shared = Rc::new(RefCell::new(JsShared {
            document: None,
            url,
            allowed_origins,
            needs_render: false,
            node_to_handle: HashMap::new(),
            handle_to_node: Vec::new(),
        }));

        context.with(|ctx| -> Result<(), rquickjs::Error> {
            let globals = ctx.globals();
            globals.set(
                "log",
                Func::from(|message: String| info!(target: "js", "{}", message)),
            )?;
            let state = shared.clone();
            globals.set(
                "querySelectorAll",
                Func::from(move |selector_text: String| query_selector_all(&state, &selector_text)),
            )?;
            let state = shared.clone();
            globals.set(
                "getAttribute",
                Func::from(move |handle: u32, name: String| -> Option<String> {
                    state
                        .borrow()
                        .node_for(handle)
                        .and_then(|node| node.borrow().attribute(&name))
                }),
            )?;
            let state = shared.clone();
            globals.set(
                "innerHTML_set",
                Func::from(move |handle: u32, html: String| inner_html_set(&state, handle, html)),
            )?;
            let state = shared.clone();
            globals.set(
                "XMLHttpRequest_send",
                Func::from(
                    move |ctx: Ctx<'_>, method: String, url: String, body: Opt<String>| {
                        xhr_send(&ctx, &state, &method, &url, body.0)
                    },
                ),
            )?;
            let mut runtime_js_opts = rquickjs::context::EvalOptions::default();
            runtime_js_opts.strict = false;
            ctx.eval_with_options::<(), _>(RUNTIME_JS, runtime_js_opts)?;
            Ok(())
        })?;

        Ok(JsContext {
            _runtime: runtime,
            context,
            shared,
        })
    }

    pub fn set_document(&self, document: NodeRef) {
        self.shared.borrow_mut().document = Some(document);
    }

    /// Evaluates a page script. Errors are logged and never escape; later
    /// scripts still run.
    pub fn run(&self, script: &str, code: &str) {
        self.context.with(|ctx| {
            if let Err(err) = ctx.eval::<rquickjs::Value, _>(code).catch(&ctx) {
                warn!("script {} crashed: {}", script, err);
            }
        });
    }

    /// Dispatches an event at `node`. Returns true when a listener
    /// cancelled the default action with `preventDefault`.
    pub fn dispatch_event(&self, event_type: &str, node: &NodeRef) -> bool {
        let handle = self.shared.borrow_mut().get_handle(node);
        let code = format!(
            "!(new Node({}).dispatchEvent(new Event(\"{}\")))",
            handle, event_type
        );
        self.context.with(|ctx| {
            match ctx.eval::<bool, _>(code.as_str()).catch(&ctx) {
                Ok(cancelled) => cancelled,
                Err(err) => {
                    warn!("dispatching {} failed: {}", event_type, err);
                    false
                }
            }
        })
    }

    /// True once a host call has mutated the DOM since the last check.
    pub fn take_needs_render(&self) -> bool {
        std::mem::take(&mut self.shared.borrow_mut().needs_render)
    }
}

fn query_selector_all(state: &Rc<RefCell<JsShared>>, selector_text: &str) -> Vec<u32> {
    let Ok(selector) = CssParser::new(selector_text).selector() else {
        return Vec::new();
    };
    let Some(document) = state.borrow().document.clone() else {
        return Vec::new();
    };
    let mut flat = Vec::new();
    HtmlNode::tree_to_vec(&document, &mut flat);
    flat.into_iter()
        .filter(|node| selector.matches(node))
        .map(|node| state.borrow_mut().get_handle(&node))
        .collect()
}

fn inner_html_set(state: &Rc<RefCell<JsShared>>, handle: u32, html: String) {
    let Some(target) = state.borrow().node_for(handle) else {
        return;
    };
    let document = HtmlParser::new(&format!("<html><body>{}</body></html>", html)).parse();
    let Some(body) = document.borrow().children.first().cloned() else {
        return;
    };
    let new_children = body.borrow().children.clone();
    for child in &new_children {
        child.borrow_mut().parent = Some(Rc::downgrade(&target));
    }
    target.borrow_mut().children = new_children;
    state.borrow_mut().needs_render = true;
}

fn xhr_send(
    ctx: &Ctx<'_>,
    state: &Rc<RefCell<JsShared>>,
    method: &str,
    url_text: &str,
    body: Option<String>,
) -> rquickjs::Result<String> {
    let (tab_url, allowed_origins) = {
        let shared = state.borrow();
        (shared.url.clone(), shared.allowed_origins.clone())
    };
    let full_url = tab_url.resolve(url_text);
    if !origin_allowed(&allowed_origins, &full_url) {
        return Err(Exception::throw_message(
            ctx,
            "request blocked by Content-Security-Policy",
        ));
    }

    let payload = if method.eq_ignore_ascii_case("post") {
        body
    } else {
        None
    };
    let response = full_url.request(Some(&tab_url), payload.as_deref());
    let out = match response {
        Ok((_headers, out)) => out,
        Err(err) => {
            return Err(Exception::throw_message(
                ctx,
                &format!("XMLHttpRequest failed: {}", err),
            ));
        }
    };
    if full_url.origin() != tab_url.origin() {
        return Err(Exception::throw_message(
            ctx,
            "cross-origin XMLHttpRequest not allowed",
        ));
    }
    Ok(out)
}

/// CSP allow-list check: no list means everything is allowed; with a list,
/// only URLs whose origin appears in it pass.
pub fn origin_allowed(allowed_origins: &Option<Vec<Origin>>, url: &Url) -> bool {
    match allowed_origins {
        None => true,
        Some(origins) => url
            .origin()
            .map(|origin| origins.contains(&origin))
            .unwrap_or(false),
    }
}
