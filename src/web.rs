//! Browser backend: the live `document` as [`Page`], `window.fetch` as
//! [`FragmentSource`], and [`mount`] to wire change listeners onto bind controls.

use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use web_sys::{
    Document, Element, HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement, Response, Window,
};

use crate::config::SiteConfig;
use crate::fetch::FragmentSource;
use crate::location::PageLocation;
use crate::page::{BindControl, Page};
use crate::runtime::Runtime;
use crate::{Error, Result};

pub struct WebPage {
    document: Document,
}

impl WebPage {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    fn bind_containers(&self, config: &SiteConfig) -> Result<Vec<Element>> {
        let nodes = self
            .document
            .query_selector_all(&config.bind_tag)
            .map_err(|err| Error::Dom(js_message(&err)))?;
        Ok((0..nodes.length())
            .filter_map(|i| nodes.item(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect())
    }
}

impl Page for WebPage {
    fn bind_controls(&self, config: &SiteConfig) -> Vec<BindControl> {
        // `SiteConfig::validate` admits only plain tag names, which always parse as selectors.
        self.bind_containers(config)
            .unwrap_or_default()
            .into_iter()
            .map(|container| BindControl {
                name: container.get_attribute(&config.bind_name_attr),
                value: container
                    .first_element_child()
                    .and_then(|child| control_value(&child)),
            })
            .collect()
    }

    fn replace_outer_html(&self, element_id: &str, html: &str) -> Result<bool> {
        match self.document.get_element_by_id(element_id) {
            Some(element) => {
                element.set_outer_html(html);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn control_value(element: &Element) -> Option<String> {
    if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
        return Some(input.value());
    }
    if let Some(select) = element.dyn_ref::<HtmlSelectElement>() {
        return Some(select.value());
    }
    element
        .dyn_ref::<HtmlTextAreaElement>()
        .map(HtmlTextAreaElement::value)
}

pub struct WebFetch {
    window: Window,
}

impl WebFetch {
    pub fn new(window: Window) -> Self {
        Self { window }
    }
}

impl FragmentSource for WebFetch {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let failed = |err: JsValue| Error::Fetch {
            url: url.to_string(),
            reason: js_message(&err),
        };

        let response = JsFuture::from(self.window.fetch_with_str(url))
            .await
            .map_err(failed)?;
        let response: Response = response.dyn_into().map_err(failed)?;
        if !response.ok() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let text = JsFuture::from(response.text().map_err(failed)?)
            .await
            .map_err(failed)?;
        text.as_string().ok_or_else(|| Error::Fetch {
            url: url.to_string(),
            reason: "response body is not text".into(),
        })
    }
}

impl PageLocation {
    pub fn from_window(window: &Window) -> Result<Self> {
        let href = window
            .location()
            .href()
            .map_err(|err| Error::Dom(js_message(&err)))?;
        Ok(Self::new(href))
    }
}

/// Loads the index for the current page and adds a `change` listener to the
/// input of every bind control.
///
/// Listeners keep the returned runtime alive for the lifetime of the page.
pub async fn mount(config: SiteConfig) -> Result<Rc<Runtime<WebFetch, WebPage>>> {
    let window = web_sys::window().ok_or_else(|| Error::Dom("no global window".into()))?;
    let document = window
        .document()
        .ok_or_else(|| Error::Dom("window has no document".into()))?;
    let location = PageLocation::from_window(&window)?;

    let page = WebPage::new(document);
    let runtime = Rc::new(Runtime::load(location, config, WebFetch::new(window), page).await?);
    attach_change_listeners(&runtime)?;
    Ok(runtime)
}

fn attach_change_listeners(runtime: &Rc<Runtime<WebFetch, WebPage>>) -> Result<()> {
    for container in runtime.page().bind_containers(runtime.config())? {
        let Some(bind) = container.get_attribute(&runtime.config().bind_name_attr) else {
            continue;
        };
        let Some(input) = container.first_element_child() else {
            continue;
        };
        if control_value(&input).is_none() {
            continue;
        }

        let handler_runtime = Rc::clone(runtime);
        let on_change: Closure<dyn FnMut()> = Closure::new(move || {
            let runtime = Rc::clone(&handler_runtime);
            let bind = bind.clone();
            spawn_local(async move {
                runtime.on_bind_change(&bind).await;
            });
        });
        input
            .add_event_listener_with_callback("change", on_change.as_ref().unchecked_ref())
            .map_err(|err| Error::Dom(js_message(&err)))?;
        on_change.forget();
    }
    Ok(())
}

/// JavaScript entry point: `await mountBondOutputs()` after the page has loaded.
#[wasm_bindgen(js_name = mountBondOutputs)]
pub async fn mount_bond_outputs() -> std::result::Result<(), JsValue> {
    mount(SiteConfig::default())
        .await
        .map(|_| ())
        .map_err(|err| JsValue::from_str(&err.to_string()))
}

fn js_message(value: &JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    value
        .as_string()
        .unwrap_or_else(|| format!("{value:?}"))
}
