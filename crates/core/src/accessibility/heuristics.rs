//! Engine-free checks over a DOM inventory
//!
//! The page is asked once for a JSON inventory of images, form controls and
//! buttons; the checks themselves are pure functions over that inventory.

use serde::{Deserialize, Serialize};

use super::{Impact, PassedCheck, Violation, ViolationNode};

/// Collects the facts the manual checks need. Evaluates to a `DomInventory`.
pub const INVENTORY_SCRIPT: &str = r#"(() => {
  const describe = (el) => {
    let target = el.tagName.toLowerCase();
    if (el.id) {
      target += '#' + el.id;
    } else if (el.classList && el.classList.length) {
      target += '.' + Array.from(el.classList).join('.');
    }
    return { target, html: el.outerHTML.slice(0, 200) };
  };
  const attr = (el, name) => el.getAttribute(name);
  const labelled = (el) => !!(el.id && document.querySelector('label[for="' + CSS.escape(el.id) + '"]')) || !!el.closest('label');
  return {
    images: Array.from(document.querySelectorAll('img')).map((el) => ({
      node: describe(el),
      hasAlt: el.hasAttribute('alt'),
      ariaLabel: attr(el, 'aria-label'),
    })),
    controls: Array.from(document.querySelectorAll('input:not([type=hidden]), select, textarea')).map((el) => ({
      node: describe(el),
      hasLabel: labelled(el),
      ariaLabel: attr(el, 'aria-label'),
      ariaLabelledby: attr(el, 'aria-labelledby'),
    })),
    buttons: Array.from(document.querySelectorAll('button, [role=button]')).map((el) => ({
      node: describe(el),
      text: (el.textContent || '').trim(),
      ariaLabel: attr(el, 'aria-label'),
      title: attr(el, 'title'),
    })),
  };
})()"#;

/// Identifies one element in the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub target: String,
    #[serde(default)]
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFacts {
    pub node: NodeRef,
    pub has_alt: bool,
    #[serde(default)]
    pub aria_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlFacts {
    pub node: NodeRef,
    pub has_label: bool,
    #[serde(default)]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub aria_labelledby: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonFacts {
    pub node: NodeRef,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// What `INVENTORY_SCRIPT` reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomInventory {
    #[serde(default)]
    pub images: Vec<ImageFacts>,
    #[serde(default)]
    pub controls: Vec<ControlFacts>,
    #[serde(default)]
    pub buttons: Vec<ButtonFacts>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

impl ImageFacts {
    fn has_text_alternative(&self) -> bool {
        self.has_alt || present(&self.aria_label)
    }
}

impl ControlFacts {
    fn has_accessible_name(&self) -> bool {
        self.has_label || present(&self.aria_label) || present(&self.aria_labelledby)
    }
}

impl ButtonFacts {
    fn has_accessible_name(&self) -> bool {
        !self.text.trim().is_empty() || present(&self.aria_label) || present(&self.title)
    }
}

struct Check {
    id: &'static str,
    impact: Impact,
    description: &'static str,
    help: &'static str,
}

const IMAGE_ALT: Check = Check {
    id: "image-alt",
    impact: Impact::Serious,
    description: "Images must have alternate text",
    help: "Add an alt attribute or aria-label to every img element",
};

const FORM_LABEL: Check = Check {
    id: "label",
    impact: Impact::Critical,
    description: "Form elements must have labels",
    help: "Associate a label, aria-label or aria-labelledby with every form control",
};

const BUTTON_NAME: Check = Check {
    id: "button-name",
    impact: Impact::Serious,
    description: "Buttons must have discernible text",
    help: "Give every button text content, an aria-label or a title",
};

/// Turn one check over `total` nodes into a violation (offenders present) or a pass
fn conclude(
    check: &Check,
    total: usize,
    offenders: Vec<&NodeRef>,
    violations: &mut Vec<Violation>,
    passes: &mut Vec<PassedCheck>,
) {
    if offenders.is_empty() {
        passes.push(PassedCheck {
            id: check.id.to_string(),
            description: check.description.to_string(),
            node_count: total as u32,
        });
    } else {
        violations.push(Violation {
            id: check.id.to_string(),
            impact: check.impact,
            description: check.description.to_string(),
            help: check.help.to_string(),
            help_url: None,
            nodes: offenders
                .into_iter()
                .map(|n| ViolationNode {
                    target: n.target.clone(),
                    html: n.html.clone(),
                })
                .collect(),
        });
    }
}

/// Image alt text, form labels and button names over an inventory
pub fn evaluate_inventory(inventory: &DomInventory) -> (Vec<Violation>, Vec<PassedCheck>) {
    let mut violations = Vec::new();
    let mut passes = Vec::new();

    let images = inventory
        .images
        .iter()
        .filter(|i| !i.has_text_alternative())
        .map(|i| &i.node)
        .collect();
    conclude(&IMAGE_ALT, inventory.images.len(), images, &mut violations, &mut passes);

    let controls = inventory
        .controls
        .iter()
        .filter(|c| !c.has_accessible_name())
        .map(|c| &c.node)
        .collect();
    conclude(&FORM_LABEL, inventory.controls.len(), controls, &mut violations, &mut passes);

    let buttons = inventory
        .buttons
        .iter()
        .filter(|b| !b.has_accessible_name())
        .map(|b| &b.node)
        .collect();
    conclude(&BUTTON_NAME, inventory.buttons.len(), buttons, &mut violations, &mut passes);

    (violations, passes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(target: &str) -> NodeRef {
        NodeRef {
            target: target.to_string(),
            html: format!("<{}>", target),
        }
    }

    #[test]
    fn test_empty_page_passes_with_zero_nodes() {
        let (violations, passes) = evaluate_inventory(&DomInventory::default());
        assert!(violations.is_empty());
        assert_eq!(passes.len(), 3);
        assert!(passes.iter().all(|p| p.node_count == 0));
    }

    #[test]
    fn test_unlabelled_control_is_critical() {
        let inventory = DomInventory {
            controls: vec![
                ControlFacts {
                    node: node("input#email"),
                    has_label: true,
                    aria_label: None,
                    aria_labelledby: None,
                },
                ControlFacts {
                    node: node("input#search"),
                    has_label: false,
                    aria_label: Some("  ".into()),
                    aria_labelledby: None,
                },
            ],
            ..Default::default()
        };

        let (violations, _) = evaluate_inventory(&inventory);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].id, "label");
        assert_eq!(violations[0].impact, Impact::Critical);
        assert_eq!(violations[0].nodes[0].target, "input#search");
    }

    #[test]
    fn test_image_aria_label_counts_as_alt() {
        let inventory = DomInventory {
            images: vec![
                ImageFacts {
                    node: node("img.logo"),
                    has_alt: false,
                    aria_label: Some("Company logo".into()),
                },
                ImageFacts {
                    node: node("img.hero"),
                    has_alt: true,
                    aria_label: None,
                },
            ],
            ..Default::default()
        };

        let (violations, passes) = evaluate_inventory(&inventory);
        assert!(violations.is_empty());
        let image_pass = passes.iter().find(|p| p.id == "image-alt").unwrap();
        assert_eq!(image_pass.node_count, 2);
    }

    #[test]
    fn test_icon_button_without_name() {
        let inventory = DomInventory {
            buttons: vec![
                ButtonFacts {
                    node: node("button.close"),
                    text: String::new(),
                    aria_label: None,
                    title: None,
                },
                ButtonFacts {
                    node: node("button.menu"),
                    text: String::new(),
                    aria_label: None,
                    title: Some("Menu".into()),
                },
            ],
            ..Default::default()
        };

        let (violations, _) = evaluate_inventory(&inventory);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].impact, Impact::Serious);
        assert_eq!(violations[0].nodes.len(), 1);
    }

    #[test]
    fn test_inventory_parses_camel_case() {
        let json = serde_json::json!({
            "images": [{"node": {"target": "img", "html": "<img>"}, "hasAlt": false, "ariaLabel": null}],
            "controls": [],
            "buttons": [{"node": {"target": "button"}, "text": "Go"}]
        });
        let inventory: DomInventory = serde_json::from_value(json).unwrap();
        assert_eq!(inventory.images.len(), 1);
        assert!(!inventory.images[0].has_alt);
        assert_eq!(inventory.buttons[0].text, "Go");
    }
}
