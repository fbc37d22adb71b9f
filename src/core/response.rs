// reflivtrace - core/response.rs
//
// Recognition of the REFLIV shipment-tracking response schema.
// Core layer: operates on an XML string, no I/O.
//
// Two vocabularies appear in the wild and are treated as one schema:
//
//   <TrackingResponse>                 <root>
//     <Event>                            <requestedData>
//       <Status>DELIVERED</Status>         <stateData>
//       <Description>..</Description>        <title>DELIVERED</title>
//       <Timestamp>..</Timestamp>            <descriptionText>..</descriptionText>
//       <Location>..</Location>              <timestamp>..</timestamp>
//     </Event>                                <location>..</location>
//   </TrackingResponse>                    </stateData>
//                                        </requestedData>
//                                      </root>
//
// Element names are matched case-insensitively and namespaces are ignored.
// Unrecognised elements are skipped.

use roxmltree::{Document, Node};

/// Element names that mark a single status event.
const EVENT_ELEMENTS: &[&str] = &["event", "statedata"];

const STATUS_FIELDS: &[&str] = &["status", "title"];
const DESCRIPTION_FIELDS: &[&str] = &["description", "descriptiontext"];
const TIMESTAMP_FIELDS: &[&str] = &["timestamp"];
const LOCATION_FIELDS: &[&str] = &["location"];

/// Identifier fields looked up on the event first, then on its ancestors.
const REFERENCE_FIELDS: &[&str] = &["referencenumber", "reference"];
const SHIPPING_UNIT_FIELDS: &[&str] = &["shippingunitreference", "shippingunitref"];

/// Raw field values of one status event, before validation.
///
/// `status` is kept verbatim. All other values are trimmed. Blank text is
/// reported as `None` for every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseEvent {
    pub reference: Option<String>,
    pub shipping_unit_reference: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub timestamp: Option<String>,
    pub location: Option<String>,
}

/// Parse an XML response fragment and return its status events in
/// document order.
///
/// A well-formed fragment with no recognised events yields an empty list.
/// Events nested inside another event are not reported separately.
pub fn extract_events(xml: &str) -> Result<Vec<ResponseEvent>, roxmltree::Error> {
    let doc = Document::parse(xml)?;

    let events = doc
        .descendants()
        .filter(|n| is_named(*n, EVENT_ELEMENTS))
        .filter(|n| !n.ancestors().skip(1).any(|a| is_named(a, EVENT_ELEMENTS)))
        .map(|event| ResponseEvent {
            reference: inherited_text(event, REFERENCE_FIELDS),
            shipping_unit_reference: inherited_text(event, SHIPPING_UNIT_FIELDS),
            status: child_raw_text(event, STATUS_FIELDS),
            description: child_text(event, DESCRIPTION_FIELDS),
            timestamp: child_text(event, TIMESTAMP_FIELDS),
            location: child_text(event, LOCATION_FIELDS),
        })
        .collect();

    Ok(events)
}

fn is_named(node: Node<'_, '_>, names: &[&str]) -> bool {
    node.is_element()
        && names
            .iter()
            .any(|n| node.tag_name().name().eq_ignore_ascii_case(n))
}

/// Trimmed text of the first direct child element matching one of `names`.
fn child_text(node: Node<'_, '_>, names: &[&str]) -> Option<String> {
    node.children()
        .filter(|c| is_named(*c, names))
        .find_map(|c| {
            let text = c.text()?.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
}

/// Untrimmed text of the first direct child element matching one of
/// `names` whose text is not blank.
fn child_raw_text(node: Node<'_, '_>, names: &[&str]) -> Option<String> {
    node.children()
        .filter(|c| is_named(*c, names))
        .find_map(|c| {
            let text = c.text()?;
            (!text.trim().is_empty()).then(|| text.to_string())
        })
}

/// Like `child_text`, but walks from `node` up through its ancestors and
/// returns the nearest match.
fn inherited_text(node: Node<'_, '_>, names: &[&str]) -> Option<String> {
    node.ancestors()
        .filter(|a| a.is_element())
        .find_map(|a| child_text(a, names))
}
