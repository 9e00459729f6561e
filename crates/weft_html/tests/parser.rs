use std::path::PathBuf;

use serde_json::json;

use weft_html::node::Node;
use weft_html::parser::{HtmlParser, ParserOptions, TagNameCasing};
use weft_html::tree::{write_html, TreeNode};
use weft_shared::errors::Error;

fn parser_with(options: ParserOptions) -> HtmlParser {
    HtmlParser::new(options)
}

fn parser() -> HtmlParser {
    parser_with(ParserOptions::default())
}

/// Writes a unique temp file for file-based tests
fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("weft-{}-{name}", std::process::id()));
    std::fs::write(&path, bytes).expect("write temp file");
    path
}

fn element(tree: &[TreeNode], index: usize) -> (&str, Option<&Vec<TreeNode>>) {
    match &tree[index] {
        TreeNode::Element {
            tag_name, children, ..
        } => (tag_name.as_str(), children.as_ref()),
        other => panic!("expected element at {index}, got {other:?}"),
    }
}

#[tokio::test]
async fn simple_element_with_text() {
    // S1
    let tree = parser()
        .parse_string("<div>Hello, world!</div>")
        .to_array()
        .await
        .expect("tree");

    assert_eq!(
        tree,
        vec![TreeNode::Element {
            tag_name: "div".into(),
            attributes: None,
            children: Some(vec![TreeNode::Text {
                text_content: "Hello, world!".into(),
                l: 1,
                c: 6,
            }]),
            l: 1,
            c: 2,
        }]
    );
}

#[tokio::test]
async fn casing_is_normalized_by_default() {
    // S2
    let tree = parser()
        .parse_string("<DIV>hi</Div>")
        .to_array()
        .await
        .expect("tree");

    assert_eq!(
        tree,
        vec![TreeNode::Element {
            tag_name: "div".into(),
            attributes: None,
            children: Some(vec![TreeNode::Text {
                text_content: "hi".into(),
                l: 1,
                c: 6,
            }]),
            l: 1,
            c: 2,
        }]
    );
}

#[tokio::test]
async fn preserve_casing_ignores_mismatched_close() {
    // S3
    let options = ParserOptions {
        tag_name_casing: TagNameCasing::Preserve,
        ..Default::default()
    };
    let tree = parser_with(options)
        .parse_string("<Div></div>hello")
        .to_array()
        .await
        .expect("tree");

    assert_eq!(
        tree,
        vec![TreeNode::Element {
            tag_name: "Div".into(),
            attributes: None,
            children: Some(vec![TreeNode::Text {
                text_content: "hello".into(),
                l: 1,
                c: 12,
            }]),
            l: 1,
            c: 2,
        }]
    );
}

#[tokio::test]
async fn self_closing_and_void_elements() {
    // S4
    let tree = parser()
        .parse_string("<div/>Hello!<input type=text />after")
        .to_array()
        .await
        .expect("tree");

    assert_eq!(
        serde_json::to_value(&tree).expect("json"),
        json!([
            { "tagName": "div", "l": 1, "c": 2 },
            { "textContent": "Hello!", "l": 1, "c": 7 },
            {
                "tagName": "input",
                "attributes": [ { "name": "type", "value": "text", "l": 1, "c": 20 } ],
                "l": 1,
                "c": 14
            },
            { "textContent": "after", "l": 1, "c": 32 },
        ])
    );
}

#[tokio::test]
async fn quoted_close_tag_does_not_terminate_style() {
    // S5
    let tree = parser()
        .parse_string("<style>a{content:'</style>'}</style>")
        .to_array()
        .await
        .expect("tree");

    let (tag_name, children) = element(&tree, 0);
    assert_eq!(tag_name, "style");
    assert_eq!(
        children.expect("children").as_slice(),
        &[TreeNode::Text {
            text_content: "a{content:'</style>'}".into(),
            l: 1,
            c: 8,
        }]
    );
}

#[tokio::test]
async fn doctype_declaration_comes_first() {
    // S6
    let tree = parser()
        .parse_string("<!DOCTYPE html><html></html>")
        .to_array()
        .await
        .expect("tree");

    assert_eq!(
        tree,
        vec![
            TreeNode::Doctype {
                doctype_declaration: "html".into(),
                l: 1,
                c: 1,
            },
            TreeNode::Element {
                tag_name: "html".into(),
                attributes: None,
                children: None,
                l: 1,
                c: 17,
            },
        ]
    );
}

#[tokio::test]
async fn utf16le_file_with_bom() {
    // S7
    let mut bytes = vec![0xFF, 0xFE];
    for unit in "<div>Hi 👋</div>".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let path = temp_file("utf16le.html", &bytes);

    let tree = parser()
        .parse_file(&path)
        .await
        .expect("open")
        .to_array()
        .await
        .expect("tree");
    std::fs::remove_file(&path).ok();

    let (tag_name, children) = element(&tree, 0);
    assert_eq!(tag_name, "div");
    assert!(matches!(
        children.expect("children").as_slice(),
        [TreeNode::Text { text_content, .. }] if text_content == "Hi 👋"
    ));
}

#[tokio::test]
async fn toggling_self_closing_syntax() {
    // property 6
    let tree = parser()
        .parse_string("<div/>x")
        .to_array()
        .await
        .expect("tree");
    assert_eq!(element(&tree, 0), ("div", None));
    assert!(matches!(&tree[1], TreeNode::Text { text_content, .. } if text_content == "x"));

    let options = ParserOptions {
        ignore_self_closing_syntax: true,
        ..Default::default()
    };
    let tree = parser_with(options)
        .parse_string("<div/>x")
        .to_array()
        .await
        .expect("tree");
    assert_eq!(tree.len(), 1);
    let (tag_name, children) = element(&tree, 0);
    assert_eq!(tag_name, "div");
    assert!(matches!(
        children.expect("children").as_slice(),
        [TreeNode::Text { text_content, .. }] if text_content == "x"
    ));
}

#[tokio::test]
async fn parse_result_is_single_use() {
    // property 5
    let mut result = parser().parse_string("<p>once</p>");
    result.to_array().await.expect("first consumption");

    assert_eq!(result.to_array().await.expect_err("second"), Error::Consumed);
    assert_eq!(result.stream().expect_err("third"), Error::Consumed);
}

#[tokio::test]
async fn round_trip_reparses_to_equivalent_tree() {
    // property 7
    let input = r#"<!DOCTYPE html><ul id="nav"><li>one</li><li>two<br/></li></ul>done"#;

    let first = parser().parse_string(input).to_array().await.expect("tree");
    let written = write_html(&first);
    let second = parser().parse_string(&written).to_array().await.expect("tree");

    // positions shift between the renditions; the written form is the
    // position-free projection, so equal output means equivalent trees
    assert_eq!(write_html(&second), written);
}

#[tokio::test]
async fn streaming_delivers_parents_before_children() {
    let mut result = parser().parse_string("<a><b>x</b></a>tail");
    let mut root = result.stream().expect("stream");

    let Some(Ok(Node::Element {
        tag_name,
        children: Some(mut a_children),
        ..
    })) = root.next().await
    else {
        panic!("expected element with children");
    };
    assert_eq!(tag_name, "a");

    // the outer element is already delivered while its body is unparsed
    let Some(Ok(Node::Element {
        tag_name,
        children: Some(mut b_children),
        ..
    })) = a_children.next().await
    else {
        panic!("expected nested element");
    };
    assert_eq!(tag_name, "b");

    assert!(matches!(
        b_children.next().await,
        Some(Ok(Node::Text { text, .. })) if text == "x"
    ));
    assert!(b_children.next().await.is_none());
    assert!(a_children.next().await.is_none());

    assert!(matches!(
        root.next().await,
        Some(Ok(Node::Text { text, .. })) if text == "tail"
    ));
    assert!(root.next().await.is_none());
}

#[tokio::test]
async fn abandoned_child_stream_does_not_block() {
    let mut result = parser().parse_string("<ul><li>a</li><li>b</li></ul><p>end</p>");
    let mut root = result.stream().expect("stream");

    let Some(Ok(Node::Element { tag_name, children, .. })) = root.next().await else {
        panic!("expected ul");
    };
    assert_eq!(tag_name, "ul");
    // drop the child stream without reading it
    drop(children);

    let Some(Ok(Node::Element { tag_name, children, .. })) = root.next().await else {
        panic!("expected p");
    };
    assert_eq!(tag_name, "p");
    drop(children);

    assert!(root.next().await.is_none());
}

#[tokio::test]
async fn decode_error_aborts_open_streams() {
    let path = temp_file("bad-utf8.html", b"<div>a\xFFb</div>");

    let mut result = parser().parse_file(&path).await.expect("open");
    let mut root = result.stream().expect("stream");
    std::fs::remove_file(&path).ok();

    let Some(Ok(Node::Element {
        children: Some(mut children),
        ..
    })) = root.next().await
    else {
        panic!("expected div");
    };

    // the error arrives in-band on the innermost open stream and on the root
    assert!(matches!(children.next().await, Some(Err(Error::Decode { .. }))));
    assert!(children.next().await.is_none());

    assert!(matches!(root.next().await, Some(Err(Error::Decode { .. }))));
    assert!(root.next().await.is_none());
}

#[tokio::test]
async fn missing_file_propagates_io_error() {
    let err = parser()
        .parse_file("/definitely/not/here.html")
        .await
        .expect_err("should fail");
    assert!(matches!(err, Error::Io(_)));
}

#[tokio::test]
async fn empty_elements_have_no_children_entry() {
    let tree = parser()
        .parse_string("<div></div>")
        .to_array()
        .await
        .expect("tree");

    assert_eq!(
        serde_json::to_value(&tree).expect("json"),
        json!([{ "tagName": "div", "l": 1, "c": 2 }])
    );
}

#[tokio::test]
async fn stray_and_unclosed_tags_are_tolerated() {
    let tree = parser()
        .parse_string("</nope><section><p>dangling")
        .to_array()
        .await
        .expect("tree");

    let (tag_name, children) = element(&tree, 0);
    assert_eq!(tag_name, "section");
    let children = children.expect("children");
    let TreeNode::Element {
        tag_name, children, ..
    } = &children[0]
    else {
        panic!("expected p");
    };
    assert_eq!(tag_name, "p");
    assert!(matches!(
        children.as_ref().expect("text").as_slice(),
        [TreeNode::Text { text_content, .. }] if text_content == "dangling"
    ));
}

#[tokio::test]
async fn nested_close_propagates_through_levels() {
    // </ul> closes the open li as well; the stray </li> after it is dropped
    let tree = parser()
        .parse_string("<ul><li>a</ul></li>rest")
        .to_array()
        .await
        .expect("tree");

    assert_eq!(
        serde_json::to_value(&tree).expect("json"),
        json!([
            {
                "tagName": "ul",
                "children": [
                    { "tagName": "li", "children": [ { "textContent": "a", "l": 1, "c": 9 } ], "l": 1, "c": 6 },
                ],
                "l": 1,
                "c": 2
            },
            { "textContent": "rest", "l": 1, "c": 20 },
        ])
    );
}

#[tokio::test]
async fn convenience_helper_uses_default_options() {
    let tree = weft_html::parse_string_to_tree("<em>hi</em>")
        .await
        .expect("tree");
    assert_eq!(element(&tree, 0).0, "em");
}
