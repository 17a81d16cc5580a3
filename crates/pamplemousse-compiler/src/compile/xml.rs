//! Small `roxmltree` traversal helpers shared by every PMML element
//! parser in this module. None of this is PMML-specific beyond the
//! convention that element and attribute names are compared verbatim
//! (PMML has no namespaced attributes worth caring about here).

use roxmltree::Node;

pub fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.is_element() && n.tag_name().name() == name)
}

pub fn children<'a, 'input>(node: Node<'a, 'input>, name: &str) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// Any direct element child, skipping PMML's `Extension` elements the way
/// the rest of the document does.
pub fn first_non_extension<'a, 'input>(node: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.is_element() && n.tag_name().name() != "Extension")
}

pub fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name)
}

pub fn attr_f64(node: Node<'_, '_>, name: &str) -> Option<f64> {
    node.attribute(name).and_then(|s| s.parse().ok())
}

pub fn attr_usize(node: Node<'_, '_>, name: &str) -> Option<usize> {
    node.attribute(name).and_then(|s| s.parse().ok())
}

pub fn line(node: Node<'_, '_>) -> Option<u32> {
    Some(node.range().start as u32)
}

/// Text content of the first `Array` child, split on PMML's whitespace
/// separator. Quoted entries (`"a b" c`) are not unquoted here: none of
/// the model kinds this compiler targets use a string `Array` containing
/// embedded whitespace.
pub fn array_values(node: Node<'_, '_>) -> Vec<String> {
    node.text().unwrap_or("").split_whitespace().map(str::to_string).collect()
}
