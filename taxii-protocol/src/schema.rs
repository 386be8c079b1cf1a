//! Structural validation of TAXII documents.
//!
//! Each version describes its message binding as a table of element rules.
//! Validation walks the document once and collects every violation instead
//! of stopping at the first one, so a client gets the full list back in the
//! status message. Child order is not checked, cardinality is.

use crate::xml::{parse_bool, parse_datetime, Element};

/// Lexical type of an attribute value or text content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Boolean,
    Integer,
    DateTime,
    AnyUri,
    Enum(&'static [&'static str]),
}

impl ValueType {
    fn accepts(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            ValueType::String => true,
            ValueType::Boolean => parse_bool(value).is_some(),
            ValueType::Integer => value.parse::<i64>().is_ok(),
            ValueType::DateTime => parse_datetime(value).is_some(),
            ValueType::AnyUri => !value.is_empty() && !value.contains(char::is_whitespace),
            ValueType::Enum(allowed) => allowed.contains(&value),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            ValueType::String => "xs:string",
            ValueType::Boolean => "xs:boolean",
            ValueType::Integer => "xs:integer",
            ValueType::DateTime => "xs:dateTime",
            ValueType::AnyUri => "xs:anyURI",
            ValueType::Enum(_) => "enumeration",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AttributeRule {
    pub name: &'static str,
    pub value: ValueType,
    pub required: bool,
}

impl AttributeRule {
    pub const fn required(name: &'static str, value: ValueType) -> Self {
        Self {
            name,
            value,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, value: ValueType) -> Self {
        Self {
            name,
            value,
            required: false,
        }
    }
}

/// Allowed occurrences of a child element.
#[derive(Debug, Clone, Copy)]
pub struct ChildRule {
    pub name: &'static str,
    pub min: u32,
    /// `None` means unbounded.
    pub max: Option<u32>,
    /// Rules sharing a choice label are alternatives: exactly one of them
    /// must be present.
    pub choice: Option<&'static str>,
}

impl ChildRule {
    const fn new(name: &'static str, min: u32, max: Option<u32>) -> Self {
        Self {
            name,
            min,
            max,
            choice: None,
        }
    }

    pub const fn one(name: &'static str) -> Self {
        Self::new(name, 1, Some(1))
    }

    pub const fn optional(name: &'static str) -> Self {
        Self::new(name, 0, Some(1))
    }

    pub const fn many(name: &'static str) -> Self {
        Self::new(name, 0, None)
    }

    pub const fn at_least_one(name: &'static str) -> Self {
        Self::new(name, 1, None)
    }

    /// A single element that is one alternative of the named choice.
    pub const fn choice(name: &'static str, choice: &'static str) -> Self {
        Self {
            choice: Some(choice),
            ..Self::new(name, 0, Some(1))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ContentModel {
    Empty,
    Text(ValueType),
    Children(&'static [ChildRule]),
    /// Anything goes, contents are not inspected.
    Any,
}

#[derive(Debug, Clone, Copy)]
pub struct ElementRule {
    pub name: &'static str,
    pub attributes: &'static [AttributeRule],
    pub content: ContentModel,
}

/// Validation rules for one message binding.
#[derive(Debug)]
pub struct Schema {
    pub namespace: &'static str,
    /// Elements allowed as document root.
    pub roots: &'static [&'static str],
    pub elements: &'static [ElementRule],
}

impl Schema {
    pub fn rule(&self, name: &str) -> Option<&ElementRule> {
        self.elements.iter().find(|r| r.name == name)
    }

    /// Validates a document, returning every violation found.
    pub fn validate(&self, root: &Element) -> Vec<String> {
        let mut errors = Vec::new();

        if root.namespace.as_deref() != Some(self.namespace)
            || !self.roots.contains(&root.name.as_str())
        {
            errors.push(format!(
                "Element '{}': No matching global declaration available for the validation root.",
                display_name(root)
            ));
            return errors;
        }

        self.validate_element(root, &mut errors);
        errors
    }

    fn validate_element(&self, element: &Element, errors: &mut Vec<String>) {
        let Some(rule) = self.rule(&element.name) else {
            errors.push(format!(
                "Element '{}': This element is not expected.",
                display_name(element)
            ));
            return;
        };

        self.validate_attributes(element, rule, errors);

        match rule.content {
            ContentModel::Any => {}
            ContentModel::Empty => {
                if element.has_element_children() || !element.text().is_empty() {
                    errors.push(format!(
                        "Element '{}': No content is allowed.",
                        display_name(element)
                    ));
                }
            }
            ContentModel::Text(value) => {
                if element.has_element_children() {
                    errors.push(format!(
                        "Element '{}': Element content is not allowed, because the type definition is simple.",
                        display_name(element)
                    ));
                } else {
                    let text = element.text();
                    if !value.accepts(&text) {
                        errors.push(format!(
                            "Element '{}': '{}' is not a valid value of the atomic type '{}'.",
                            display_name(element),
                            text,
                            value.type_name()
                        ));
                    }
                }
            }
            ContentModel::Children(children) => {
                if !element.text().is_empty() {
                    errors.push(format!(
                        "Element '{}': Character content other than whitespace is not allowed.",
                        display_name(element)
                    ));
                }
                self.validate_children(element, children, errors);
            }
        }
    }

    fn validate_attributes(&self, element: &Element, rule: &ElementRule, errors: &mut Vec<String>) {
        for attr in rule.attributes {
            match element.attr(attr.name) {
                Some(value) if !attr.value.accepts(value) => errors.push(format!(
                    "Element '{}', attribute '{}': '{}' is not a valid value of the atomic type '{}'.",
                    display_name(element),
                    attr.name,
                    value,
                    attr.value.type_name()
                )),
                Some(_) => {}
                None if attr.required => errors.push(format!(
                    "Element '{}': The attribute '{}' is required but missing.",
                    display_name(element),
                    attr.name
                )),
                None => {}
            }
        }

        for (key, _) in &element.attributes {
            // Namespace declarations and foreign attributes are always allowed
            if key == "xmlns" || key.contains(':') {
                continue;
            }
            if !rule.attributes.iter().any(|a| a.name == key) {
                errors.push(format!(
                    "Element '{}', attribute '{}': The attribute '{}' is not allowed.",
                    display_name(element),
                    key,
                    key
                ));
            }
        }
    }

    fn validate_children(&self, element: &Element, rules: &[ChildRule], errors: &mut Vec<String>) {
        let own: Vec<&Element> = element
            .elements()
            .filter(|c| c.namespace.as_deref() == Some(self.namespace))
            .collect();

        for child in &own {
            if !rules.iter().any(|r| r.name == child.name) {
                errors.push(format!(
                    "Element '{}': This element is not expected.",
                    display_name(child)
                ));
            }
        }

        for rule in rules {
            let count = own.iter().filter(|c| c.name == rule.name).count() as u32;
            if count < rule.min {
                errors.push(format!(
                    "Element '{}': Missing child element(s). Expected is ( {{{}}}{} ).",
                    display_name(element),
                    self.namespace,
                    rule.name
                ));
            }
            if rule.max.is_some_and(|max| count > max) {
                errors.push(format!(
                    "Element '{}': Element '{}' occurs {} times, at most {} expected.",
                    display_name(element),
                    rule.name,
                    count,
                    rule.max.unwrap_or_default()
                ));
            }
        }

        let mut seen_choices: Vec<&str> = Vec::new();
        for label in rules.iter().filter_map(|r| r.choice) {
            if seen_choices.contains(&label) {
                continue;
            }
            seen_choices.push(label);
            let alternatives: Vec<&str> = rules
                .iter()
                .filter(|r| r.choice == Some(label))
                .map(|r| r.name)
                .collect();
            let present = alternatives
                .iter()
                .filter(|name| own.iter().any(|c| c.name == **name))
                .count();
            if present == 0 {
                errors.push(format!(
                    "Element '{}': Missing child element(s). Expected is one of ( {} ).",
                    display_name(element),
                    alternatives.join(", ")
                ));
            } else if present > 1 {
                errors.push(format!(
                    "Element '{}': Only one of ( {} ) is allowed.",
                    display_name(element),
                    alternatives.join(", ")
                ));
            }
        }

        for child in own {
            if rules.iter().any(|r| r.name == child.name) {
                self.validate_element(child, errors);
            }
        }
    }
}

fn display_name(element: &Element) -> String {
    match &element.namespace {
        Some(ns) => format!("{{{}}}{}", ns, element.name),
        None => element.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    const NS: &str = "urn:test";

    static SCHEMA: Schema = Schema {
        namespace: NS,
        roots: &["Root", "Pick"],
        elements: &[
            ElementRule {
                name: "Root",
                attributes: &[
                    AttributeRule::required("id", ValueType::String),
                    AttributeRule::optional("flag", ValueType::Boolean),
                ],
                content: ContentModel::Children(&[
                    ChildRule::one("Name"),
                    ChildRule::many("Item"),
                    ChildRule::optional("Blob"),
                ]),
            },
            ElementRule {
                name: "Pick",
                attributes: &[],
                content: ContentModel::Children(&[
                    ChildRule::choice("Left", "side"),
                    ChildRule::choice("Right", "side"),
                ]),
            },
            ElementRule {
                name: "Left",
                attributes: &[],
                content: ContentModel::Empty,
            },
            ElementRule {
                name: "Right",
                attributes: &[],
                content: ContentModel::Empty,
            },
            ElementRule {
                name: "Name",
                attributes: &[],
                content: ContentModel::Text(ValueType::String),
            },
            ElementRule {
                name: "Item",
                attributes: &[AttributeRule::optional(
                    "kind",
                    ValueType::Enum(&["A", "B"]),
                )],
                content: ContentModel::Text(ValueType::Integer),
            },
            ElementRule {
                name: "Blob",
                attributes: &[],
                content: ContentModel::Any,
            },
        ],
    };

    fn validate(doc: &str) -> Vec<String> {
        SCHEMA.validate(&parse_document(doc.as_bytes()).unwrap())
    }

    #[test]
    fn test_valid_document() {
        let errors = validate(
            r#"<Root xmlns="urn:test" id="1" flag="true"><Name>n</Name><Item kind="A">3</Item><Item>4</Item><Blob><x:y xmlns:x="urn:other"/></Blob></Root>"#,
        );
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_wrong_root() {
        let errors = validate(r#"<Other xmlns="urn:test"/>"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("No matching global declaration"));

        let errors = validate(r#"<Root id="1"><Name>n</Name></Root>"#);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_collects_all_errors() {
        let errors = validate(
            r#"<Root xmlns="urn:test" flag="maybe" extra="1"><Item kind="C">x</Item><Unknown/></Root>"#,
        );
        assert!(errors.iter().any(|e| e.contains("'id' is required")));
        assert!(errors.iter().any(|e| e.contains("'maybe'")));
        assert!(errors.iter().any(|e| e.contains("'extra' is not allowed")));
        assert!(errors.iter().any(|e| e.contains("Unknown") && e.contains("not expected")));
        assert!(errors.iter().any(|e| e.contains("Missing child") && e.contains("Name")));
        assert!(errors.iter().any(|e| e.contains("'C'")));
        assert!(errors.iter().any(|e| e.contains("'x'") && e.contains("xs:integer")));
    }

    #[test]
    fn test_cardinality_upper_bound() {
        let errors =
            validate(r#"<Root xmlns="urn:test" id="1"><Name>a</Name><Name>b</Name></Root>"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("occurs 2 times"));
    }

    #[test]
    fn test_choice_needs_exactly_one() {
        assert!(validate(r#"<Pick xmlns="urn:test"><Left/></Pick>"#).is_empty());
        assert!(validate(r#"<Pick xmlns="urn:test"><Right/></Pick>"#).is_empty());

        let errors = validate(r#"<Pick xmlns="urn:test"/>"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("one of ( Left, Right )"), "{errors:?}");

        let errors = validate(r#"<Pick xmlns="urn:test"><Left/><Right/></Pick>"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Only one of ( Left, Right )"), "{errors:?}");
    }

    #[test]
    fn test_foreign_children_ignored() {
        let errors = validate(
            r#"<Root xmlns="urn:test" xmlns:ds="urn:dsig" id="1"><Name>a</Name><ds:Signature/></Root>"#,
        );
        assert!(errors.is_empty(), "{errors:?}");
    }
}
