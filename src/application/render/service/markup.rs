use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use lol_html::{
    RewriteStrSettings, doc_comments, element, html_content::ContentType, rewrite_str, text,
};

use crate::application::render::{
    types::{NODE_SLOT_ATTRIBUTE, RenderError, slot_markup},
    widgets::{ControlKind, WidgetDescriptor, WidgetOption},
};

use super::config::{denied_selector, unwrapped_selector};

pub(crate) struct MarkupOutcome {
    pub(crate) html: String,
    pub(crate) widgets: Vec<WidgetDescriptor>,
}

#[derive(Default)]
struct ExtractState {
    widgets: Vec<PendingWidget>,
    first_slot: usize,
}

struct PendingWidget {
    descriptor: WidgetDescriptor,
    options: Vec<PendingOption>,
    label: String,
}

struct PendingOption {
    value: Option<String>,
    label: String,
    selected: bool,
}

impl ExtractState {
    /// Register a widget and return the slot index it occupies.
    fn push(&mut self, descriptor: WidgetDescriptor) -> usize {
        self.widgets.push(PendingWidget {
            descriptor,
            options: Vec::new(),
            label: String::new(),
        });
        self.first_slot + self.widgets.len() - 1
    }

    fn last_of(&mut self, kind: ControlKind) -> Option<&mut PendingWidget> {
        self.widgets
            .iter_mut()
            .rev()
            .find(|widget| widget.descriptor.control_kind == kind)
    }

    fn finish(self) -> Vec<WidgetDescriptor> {
        self.widgets
            .into_iter()
            .map(|pending| {
                let PendingWidget {
                    mut descriptor,
                    options,
                    label,
                } = pending;
                let label = label.trim();
                if !label.is_empty() {
                    descriptor.label = Some(label.to_string());
                }
                descriptor.options = options
                    .into_iter()
                    .map(|option| {
                        let label = option.label.trim().to_string();
                        WidgetOption {
                            value: option.value.unwrap_or_else(|| label.clone()),
                            label,
                            selected: option.selected,
                        }
                    })
                    .collect();
                descriptor
            })
            .collect()
    }
}

/// Apply the raw-HTML deny-list to prose and lift form controls out of it.
///
/// HTML comments left in the markup are hidden structural comments and are
/// dropped.
///
/// Each control is replaced by an empty slot element numbered from
/// `first_slot`; the returned descriptors are in slot order.
pub(crate) fn rewrite_prose(html: &str, first_slot: usize) -> Result<MarkupOutcome, RenderError> {
    let state = Rc::new(RefCell::new(ExtractState {
        first_slot,
        ..ExtractState::default()
    }));
    let denied = denied_selector();
    let unwrapped = unwrapped_selector();

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(denied.as_str(), |el| {
                    el.remove();
                    Ok(())
                }),
                element!(unwrapped.as_str(), |el| {
                    el.remove_and_keep_content();
                    Ok(())
                }),
                element!("input", {
                    let state = Rc::clone(&state);
                    move |el| {
                        let kind = el
                            .get_attribute("type")
                            .map(|token| ControlKind::from_token(&token))
                            .unwrap_or(ControlKind::Text);
                        let descriptor = WidgetDescriptor {
                            attributes: collect_attributes(el.attributes()),
                            ..WidgetDescriptor::new(kind)
                        };
                        let slot = state.borrow_mut().push(descriptor);
                        el.replace(&slot_markup(slot, false), ContentType::Html);
                        Ok(())
                    }
                }),
                element!("button, textarea, select", {
                    let state = Rc::clone(&state);
                    move |el| {
                        let kind = match el.tag_name().as_str() {
                            "button" => ControlKind::Submit,
                            "select" => ControlKind::Select,
                            _ => ControlKind::Text,
                        };
                        let descriptor = WidgetDescriptor {
                            attributes: collect_attributes(el.attributes()),
                            ..WidgetDescriptor::new(kind)
                        };
                        let slot = state.borrow_mut().push(descriptor);
                        el.before(&slot_markup(slot, false), ContentType::Html);
                        el.remove_and_keep_content();
                        Ok(())
                    }
                }),
                element!("select option", {
                    let state = Rc::clone(&state);
                    move |el| {
                        if let Some(select) = state.borrow_mut().last_of(ControlKind::Select) {
                            select.options.push(PendingOption {
                                value: el.get_attribute("value"),
                                label: String::new(),
                                selected: el.has_attribute("selected"),
                            });
                        }
                        el.remove_and_keep_content();
                        Ok(())
                    }
                }),
                text!("select option", {
                    let state = Rc::clone(&state);
                    move |t| {
                        if let Some(option) = state
                            .borrow_mut()
                            .last_of(ControlKind::Select)
                            .and_then(|select| select.options.last_mut())
                        {
                            option.label.push_str(t.as_str());
                        }
                        t.remove();
                        Ok(())
                    }
                }),
                text!("button", {
                    let state = Rc::clone(&state);
                    move |t| {
                        if let Some(button) = state.borrow_mut().last_of(ControlKind::Submit) {
                            button.label.push_str(t.as_str());
                        }
                        t.remove();
                        Ok(())
                    }
                }),
                text!("textarea", {
                    let state = Rc::clone(&state);
                    move |t| {
                        if let Some(area) = state.borrow_mut().last_of(ControlKind::Text) {
                            area.label.push_str(t.as_str());
                        }
                        t.remove();
                        Ok(())
                    }
                }),
            ],
            document_content_handlers: vec![doc_comments!(|comment| {
                comment.remove();
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Markup {
        message: err.to_string(),
    })?;

    let state = Rc::try_unwrap(state)
        .map(RefCell::into_inner)
        .map_err(|_| RenderError::Markup {
            message: "widget extraction state still shared after rewrite".to_string(),
        })?;

    Ok(MarkupOutcome {
        html: rewritten,
        widgets: state.finish(),
    })
}

/// Drop slot attributes written by the author so only slots emitted by the
/// pipeline can receive children.
pub(crate) fn strip_slot_attributes(html: &str) -> Result<String, RenderError> {
    let selector = format!("[{NODE_SLOT_ATTRIBUTE}]");
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(selector.as_str(), |el| {
                el.remove_attribute(NODE_SLOT_ATTRIBUTE);
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Markup {
        message: err.to_string(),
    })
}

fn collect_attributes(attributes: &[lol_html::html_content::Attribute<'_>]) -> BTreeMap<String, String> {
    attributes
        .iter()
        .map(|attribute| (attribute.name(), attribute.value()))
        .collect()
}
