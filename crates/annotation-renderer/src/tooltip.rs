use page_dom::{Document, DomError, NodeId, Rect, Viewport};
use serde::{Deserialize, Serialize};

pub const TOOLTIP_CLASS: &str = "sentinel-tooltip";

/// Absolute page coordinates of a floating tooltip.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub top: f64,
    pub left: f64,
}

/// Label, strongest score and segment count shown for one annotated target.
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    pub label: String,
    pub score: Option<f64>,
    pub count: usize,
}

impl Verdict {
    pub fn badge(&self) -> String {
        if self.count > 1 {
            format!("{} • {}", self.label, self.count)
        } else {
            self.label.clone()
        }
    }
}

pub fn format_score(score: Option<f64>) -> String {
    format!("{:.2}", score.filter(|s| s.is_finite()).unwrap_or(0.0))
}

/// Above the target with `gap`, or below it when that would leave the viewport;
/// right-aligned with the target and kept `margin` inside the viewport horizontally.
pub fn tooltip_position(
    rect: Option<Rect>,
    viewport: Viewport,
    (width, height): (f64, f64),
    gap: f64,
    margin: f64,
) -> Option<Placement> {
    let rect = rect.filter(|rect| !rect.is_empty())?;
    let preferred_top = viewport.scroll_y + rect.top() - height - gap;
    let top = if preferred_top < viewport.scroll_y + gap {
        viewport.scroll_y + rect.bottom() + gap
    } else {
        preferred_top
    };

    let min_left = viewport.scroll_x + margin;
    let max_left = viewport.scroll_x + viewport.width - width - margin;
    let mut left = viewport.scroll_x + rect.right() - width;
    if left < min_left {
        left = min_left;
    }
    if left > max_left {
        left = max_left;
    }
    Some(Placement { top, left })
}

pub(crate) fn build_tooltip(
    doc: &mut Document,
    verdict: &Verdict,
    score_text: &str,
) -> Result<NodeId, DomError> {
    let container = element(doc, "div", TOOLTIP_CLASS, None)?;
    doc.set_attr(container, "style", "position: absolute; visibility: hidden")?;

    let meta = element(doc, "div", "sentinel-tooltip__meta", None)?;
    let badge = element(doc, "span", "sentinel-tooltip__badge", Some(&verdict.badge()))?;
    let score = element(
        doc,
        "span",
        "sentinel-tooltip__score",
        Some(&format!("Score: {score_text}")),
    )?;
    doc.append_child(meta, badge)?;
    doc.append_child(meta, score)?;

    let actions = element(doc, "div", "sentinel-tooltip__actions", None)?;
    for (label, action) in [("Not hate?", "dismiss"), ("Flag", "flag")] {
        let button = element(doc, "button", "sentinel-tooltip__button", Some(label))?;
        doc.set_attr(button, "type", "button")?;
        doc.set_attr(button, "data-action", action)?;
        doc.append_child(actions, button)?;
    }

    doc.append_child(container, meta)?;
    doc.append_child(container, actions)?;
    Ok(container)
}

pub(crate) fn apply_placement(
    doc: &mut Document,
    container: NodeId,
    placement: Option<Placement>,
) -> Result<(), DomError> {
    let style = match placement {
        Some(Placement { top, left }) => {
            format!("position: absolute; visibility: visible; top: {top}px; left: {left}px")
        }
        None => "position: absolute; visibility: hidden".to_string(),
    };
    doc.set_attr(container, "style", &style)
}

pub(crate) fn element(
    doc: &mut Document,
    tag: &str,
    class: &str,
    text: Option<&str>,
) -> Result<NodeId, DomError> {
    let node = doc.create_element(tag);
    doc.set_attr(node, "class", class)?;
    if let Some(text) = text {
        doc.replace_children_with_text(node, text)?;
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: (f64, f64) = (200.0, 40.0);

    fn viewport(scroll_y: f64) -> Viewport {
        Viewport {
            scroll_x: 0.0,
            scroll_y,
            width: 1000.0,
            height: 800.0,
        }
    }

    #[test]
    fn sits_above_the_target_when_there_is_room() {
        let rect = Rect::new(100.0, 300.0, 400.0, 50.0);
        let placement = tooltip_position(Some(rect), viewport(1000.0), SIZE, 8.0, 12.0).unwrap();
        assert_eq!(placement.top, 1000.0 + 300.0 - 40.0 - 8.0);
        assert_eq!(placement.left, 500.0 - 200.0);
    }

    #[test]
    fn flips_below_near_the_viewport_top() {
        let rect = Rect::new(100.0, 20.0, 400.0, 50.0);
        let placement = tooltip_position(Some(rect), viewport(0.0), SIZE, 8.0, 12.0).unwrap();
        assert_eq!(placement.top, 70.0 + 8.0);
    }

    #[test]
    fn clamps_horizontally_inside_the_viewport() {
        let narrow = Rect::new(0.0, 300.0, 50.0, 20.0);
        let left = tooltip_position(Some(narrow), viewport(0.0), SIZE, 8.0, 12.0).unwrap();
        assert_eq!(left.left, 12.0);

        let overflow = Rect::new(900.0, 300.0, 400.0, 20.0);
        let right = tooltip_position(Some(overflow), viewport(0.0), SIZE, 8.0, 12.0).unwrap();
        assert_eq!(right.left, 1000.0 - 200.0 - 12.0);
    }

    #[test]
    fn hidden_without_a_layout_box() {
        assert!(tooltip_position(None, viewport(0.0), SIZE, 8.0, 12.0).is_none());
        let empty = Rect::new(10.0, 10.0, 0.0, 0.0);
        assert!(tooltip_position(Some(empty), viewport(0.0), SIZE, 8.0, 12.0).is_none());
    }

    #[test]
    fn badge_counts_multiple_segments() {
        let single = Verdict {
            label: "HATE".into(),
            score: Some(0.91),
            count: 1,
        };
        assert_eq!(single.badge(), "HATE");
        let many = Verdict { count: 3, ..single };
        assert_eq!(many.badge(), "HATE • 3");
        assert_eq!(format_score(Some(0.9149)), "0.91");
        assert_eq!(format_score(None), "0.00");
    }
}
