//! HTML serialization of the reference document.
//!
//! Output follows the element shapes the node catalog parses back: images as
//! `<img>` with a `width` attribute, upload placeholders as
//! `<div data-type="image-upload">`, rainbow text as `<span data-rainbow>`.

use std::fmt::Write;

use crate::editing::Document;
use crate::editing::document::{Block, TextBlock};
use crate::editing::marks;
use crate::nodes::{DEFAULT_IMAGE_WIDTH, Mark, NodeKind, TextBlockKind};

/// Serialize the whole document
pub fn render_html(doc: &Document) -> String {
    let mut out = String::new();
    let mut open_list: Option<&'static str> = None;

    for block in doc.blocks() {
        let list = match block {
            Block::Text(tb) => match tb.kind {
                TextBlockKind::BulletItem => Some("ul"),
                TextBlockKind::OrderedItem => Some("ol"),
                _ => None,
            },
            _ => None,
        };
        if open_list != list {
            if let Some(tag) = open_list {
                let _ = write!(out, "</{tag}>");
            }
            if let Some(tag) = list {
                let _ = write!(out, "<{tag}>");
            }
            open_list = list;
        }

        match block {
            Block::Text(tb) => render_text_block(&mut out, tb),
            Block::Leaf(node) => render_leaf(&mut out, &node.kind),
            Block::Table(table) => {
                out.push_str("<table><tbody>");
                for row in &table.rows {
                    out.push_str("<tr>");
                    for cell in row {
                        let tag = if cell.header { "th" } else { "td" };
                        let _ = write!(out, "<{tag} colspan=\"1\" rowspan=\"1\">");
                        render_text_block(&mut out, &cell.paragraph);
                        let _ = write!(out, "</{tag}>");
                    }
                    out.push_str("</tr>");
                }
                out.push_str("</tbody></table>");
            }
        }
    }
    if let Some(tag) = open_list {
        let _ = write!(out, "</{tag}>");
    }
    out
}

fn render_text_block(out: &mut String, tb: &TextBlock) {
    let align = format!(" style=\"text-align: {}\"", tb.align.as_str());
    match tb.kind {
        TextBlockKind::Paragraph => {
            let _ = write!(out, "<p{align}>");
            render_inline(out, tb);
            out.push_str("</p>");
        }
        TextBlockKind::Heading(level) => {
            let _ = write!(out, "<h{level}{align}>");
            render_inline(out, tb);
            let _ = write!(out, "</h{level}>");
        }
        TextBlockKind::CodeBlock => {
            out.push_str("<pre><code>");
            render_inline(out, tb);
            out.push_str("</code></pre>");
        }
        TextBlockKind::Blockquote => {
            out.push_str("<blockquote><p>");
            render_inline(out, tb);
            out.push_str("</p></blockquote>");
        }
        TextBlockKind::BulletItem | TextBlockKind::OrderedItem => {
            out.push_str("<li><p>");
            render_inline(out, tb);
            out.push_str("</p></li>");
        }
    }
}

fn render_inline(out: &mut String, tb: &TextBlock) {
    let content = tb.content();
    for (range, run_marks) in marks::runs(content.len(), &tb.marks) {
        let Some(text) = content.get(range) else {
            continue;
        };
        let mut close = Vec::new();
        for mark in &run_marks {
            match mark {
                Mark::Mention { id } => {
                    let _ = write!(
                        out,
                        "<span data-type=\"mention\" class=\"mention\" data-id=\"{}\">",
                        html_escape::encode_double_quoted_attribute(id)
                    );
                }
                Mark::Rainbow => out.push_str("<span data-rainbow=\"\" class=\"rainbow-text\">"),
            }
            close.push("</span>");
        }
        out.push_str(&html_escape::encode_text(text));
        for tag in close {
            out.push_str(tag);
        }
    }
}

fn render_leaf(out: &mut String, kind: &NodeKind) {
    match kind {
        NodeKind::ImageUpload(attrs) => {
            out.push_str("<div");
            push_attr(out, "src", attrs.src.as_deref());
            push_attr(out, "alt", attrs.alt.as_deref());
            push_attr(out, "title", attrs.title.as_deref());
            out.push_str(" data-type=\"image-upload\"></div>");
        }
        NodeKind::ResizableImage(attrs) => {
            out.push_str("<img");
            push_attr(out, "src", Some(&attrs.src));
            push_attr(out, "alt", attrs.alt.as_deref());
            push_attr(out, "title", attrs.title.as_deref());
            let width = attrs.width.unwrap_or(DEFAULT_IMAGE_WIDTH);
            let _ = write!(out, " width=\"{width}\">");
        }
        NodeKind::HorizontalRule | NodeKind::Spaghetto => out.push_str("<hr>"),
        // tables and text blocks are never leaves
        NodeKind::Text(_) | NodeKind::Table(_) => {}
    }
}

fn push_attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        let _ = write!(
            out,
            " {name}=\"{}\"",
            html_escape::encode_double_quoted_attribute(value)
        );
    }
}

impl Document {
    pub fn to_html(&self) -> String {
        render_html(self)
    }
}
