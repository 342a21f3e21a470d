//! Interactive widget mapping.
//!
//! Generic form elements found in document markup are described by a
//! [`WidgetDescriptor`] and mapped onto a rich control family through a single
//! `kind` attribute. The table is closed: anything unrecognised becomes free
//! text, so mapping never fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::RenderNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Color,
    Time,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Week,
    Month,
    Number,
    Search,
    Range,
    Submit,
    Checkbox,
    Password,
    Radio,
    Select,
    Text,
}

impl ControlKind {
    /// Parse an HTML `type`/tag token. Unknown tokens map to [`ControlKind::Text`].
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "color" => Self::Color,
            "time" => Self::Time,
            "date" => Self::Date,
            "datetime" | "datetime-local" => Self::DateTime,
            "week" => Self::Week,
            "month" => Self::Month,
            "number" => Self::Number,
            "search" => Self::Search,
            "range" => Self::Range,
            "submit" | "button" => Self::Submit,
            "checkbox" => Self::Checkbox,
            "password" => Self::Password,
            "radio" => Self::Radio,
            "select" => Self::Select,
            _ => Self::Text,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Time => "time",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Week => "week",
            Self::Month => "month",
            Self::Number => "number",
            Self::Search => "search",
            Self::Range => "range",
            Self::Submit => "submit",
            Self::Checkbox => "checkbox",
            Self::Password => "password",
            Self::Radio => "radio",
            Self::Select => "select",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickerGranularity {
    Date,
    Time,
    DateTime,
    Week,
    Month,
}

/// Concrete control a presentation layer instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ControlFamily {
    Picker { granularity: PickerGranularity },
    NumberStepper,
    Slider,
    ColorPicker,
    MaskedInput,
    Toggle,
    ExclusiveChoice,
    ChoiceList,
    Action,
    FreeText,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WidgetOption {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub selected: bool,
}

/// Element discovered in markup, before mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetDescriptor {
    pub control_kind: ControlKind,
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<WidgetOption>,
    /// Text content for buttons and text areas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl WidgetDescriptor {
    pub fn new(control_kind: ControlKind) -> Self {
        Self {
            control_kind,
            attributes: BTreeMap::new(),
            options: Vec::new(),
            label: None,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Mapped control with its bound value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub kind: ControlKind,
    pub family: ControlFamily,
    pub name: Option<String>,
    pub bound_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<WidgetOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

/// Change event emitted by a control, carrying the normalised new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetChange {
    pub name: Option<String>,
    pub kind: ControlKind,
    pub value: String,
}

pub fn family_for(kind: ControlKind) -> ControlFamily {
    match kind {
        ControlKind::Date => ControlFamily::Picker {
            granularity: PickerGranularity::Date,
        },
        ControlKind::Time => ControlFamily::Picker {
            granularity: PickerGranularity::Time,
        },
        ControlKind::DateTime => ControlFamily::Picker {
            granularity: PickerGranularity::DateTime,
        },
        ControlKind::Week => ControlFamily::Picker {
            granularity: PickerGranularity::Week,
        },
        ControlKind::Month => ControlFamily::Picker {
            granularity: PickerGranularity::Month,
        },
        ControlKind::Number => ControlFamily::NumberStepper,
        ControlKind::Range => ControlFamily::Slider,
        ControlKind::Color => ControlFamily::ColorPicker,
        ControlKind::Password => ControlFamily::MaskedInput,
        ControlKind::Checkbox => ControlFamily::Toggle,
        ControlKind::Radio => ControlFamily::ExclusiveChoice,
        ControlKind::Select => ControlFamily::ChoiceList,
        ControlKind::Submit => ControlFamily::Action,
        ControlKind::Search | ControlKind::Text => ControlFamily::FreeText,
    }
}

/// Map a descriptor onto its rich control.
pub fn map(descriptor: &WidgetDescriptor) -> RenderNode {
    RenderNode::InteractiveWidget(Widget::from_descriptor(descriptor))
}

impl Widget {
    pub fn from_descriptor(descriptor: &WidgetDescriptor) -> Self {
        let kind = descriptor.control_kind;
        let family = family_for(kind);
        let value = descriptor.attribute("value").map(str::to_string);

        let checked = match family {
            ControlFamily::Toggle | ControlFamily::ExclusiveChoice => {
                Some(descriptor.attributes.contains_key("checked"))
            }
            _ => None,
        };

        let bound_value = match family {
            ControlFamily::Toggle => checked.map(|on| on.to_string()),
            ControlFamily::ChoiceList => descriptor
                .options
                .iter()
                .find(|option| option.selected)
                .or_else(|| descriptor.options.first())
                .map(|option| option.value.clone()),
            ControlFamily::Action => value.or_else(|| descriptor.label.clone()),
            _ => value.or_else(|| descriptor.label.clone().filter(|_| kind == ControlKind::Text)),
        };

        Self {
            kind,
            family,
            name: descriptor.attribute("name").map(str::to_string),
            bound_value,
            checked,
            options: descriptor.options.clone(),
            label: descriptor.label.clone(),
            attributes: descriptor.attributes.clone(),
        }
    }

    /// Build the change event for a new raw value from the control.
    pub fn change(&self, value: &str) -> WidgetChange {
        let value = match self.family {
            ControlFamily::Toggle => {
                let on = matches!(
                    value.trim().to_ascii_lowercase().as_str(),
                    "true" | "on" | "1" | "checked" | "yes"
                );
                on.to_string()
            }
            _ => value.to_string(),
        };

        WidgetChange {
            name: self.name.clone(),
            kind: self.kind,
            value,
        }
    }
}
