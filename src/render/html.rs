//! The one HTML writer behind every surface.
//!
//! Surface-specific output is confined to [`Context::open_box`] (selection
//! attributes and outline, background image strategy) and
//! [`Context::assist_button`]. Everything else is written identically.

use super::{
    ObjectBody, RenderCanvas, RenderDocument, RenderObject, RenderPricing, RenderSection,
    SectionBody, Surface,
};
use crate::model::{CanvasKind, MediaKind, ShapeType};
use crate::style::{Background, ElementKind, ResolvedStyle};
use crate::template::{escape_text, is_unsafe_url};

const INDENT: &str = "  ";
const SELECTED_OUTLINE: &str = "2px solid #3b82f6";

type Decls = Vec<(&'static str, String)>;

struct Context<'a> {
    surface: &'a Surface,
    depth: usize,
    buffer: String,
}

/// An element opened by [`Context::open_box`]; closing needs to know whether
/// a background layer wrapper was opened inside it.
struct OpenBox {
    tag: &'static str,
    layered: bool,
}

impl<'a> Context<'a> {
    fn new(surface: &'a Surface) -> Self {
        Self {
            surface,
            depth: 0,
            buffer: String::new(),
        }
    }

    fn add_line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.buffer.push_str(INDENT);
        }
        self.buffer.push_str(text);
        self.buffer.push('\n');
    }

    fn indent(&mut self) {
        self.depth += 1;
    }

    fn dedent(&mut self) {
        if self.depth > 0 {
            self.depth -= 1;
        }
    }

    fn open(&mut self, text: &str) {
        self.add_line(text);
        self.indent();
    }

    fn close(&mut self, text: &str) {
        self.dedent();
        self.add_line(text);
    }

    fn get_output(self) -> String {
        self.buffer
    }

    /// Open a styled element box.
    ///
    /// `pre` declarations (positioning) come before the resolved style and
    /// `post` declarations after it, so `post` wins on conflicts.
    fn open_box(
        &mut self,
        tag: &'static str,
        class: &str,
        style: &ResolvedStyle,
        pre: Decls,
        post: Decls,
        target: Option<(ElementKind, &str)>,
    ) -> OpenBox {
        let background = style
            .background
            .as_ref()
            .filter(|b| !b.image.trim().is_empty() && !is_unsafe_url(&b.image));
        let export = matches!(self.surface, Surface::Export);

        let positioned = pre.iter().any(|(k, _)| *k == "position");
        let mut decls = pre;
        decls.extend(style.to_css());
        decls.extend(post);
        if let Some(bg) = background {
            if !positioned {
                decls.push(("position", "relative".to_string()));
            }
            if !export {
                decls.push(("background-image", format!("url({})", css_url(&bg.image))));
                decls.push(("background-size", bg.size.clone()));
                decls.push(("background-position", "center".to_string()));
                decls.push(("background-repeat", "no-repeat".to_string()));
            }
        }

        let mut attrs = format!("class=\"{}\"", escape_text(class));
        if let (Some(selection), Some((kind, id))) = (self.surface.selection(), target) {
            attrs.push_str(&format!(
                " data-select=\"{}\" data-id=\"{}\"",
                kind.name(),
                escape_text(id)
            ));
            if selection.is_selected(kind, id) {
                decls.push(("outline", SELECTED_OUTLINE.to_string()));
                decls.push(("outline-offset", "2px".to_string()));
                attrs.push_str(" data-selected=\"true\"");
            }
        }
        let css = decls
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        self.open(&format!("<{} {} style=\"{}\">", tag, attrs, escape_text(&css)));

        let layered = background.is_some();
        if let Some(bg) = background {
            self.background_layers(bg, style.border.radius, export);
            self.open("<div class=\"background-content\" style=\"position: relative; z-index: 1\">");
        }
        OpenBox { tag, layered }
    }

    fn close_box(&mut self, open: OpenBox) {
        if open.layered {
            self.close("</div>");
        }
        self.close(&format!("</{}>", open.tag));
    }

    fn background_layers(&mut self, bg: &Background, radius: f64, export: bool) {
        let cover = "position: absolute; top: 0; left: 0; width: 100%; height: 100%";
        let rounded = if radius > 0.0 {
            format!("; border-radius: {}px", radius)
        } else {
            String::new()
        };
        if export {
            let fit = match bg.size.as_str() {
                "contain" => "contain",
                "100% 100%" => "fill",
                _ => "cover",
            };
            self.add_line(&format!(
                "<img class=\"background-image\" src=\"{}\" alt=\"\" style=\"{}; object-fit: {}{}; z-index: 0\">",
                escape_text(&bg.image),
                cover,
                fit,
                rounded
            ));
        }
        if bg.has_overlay() {
            self.add_line(&format!(
                "<div class=\"background-overlay\" style=\"{}; background-color: {}{}; pointer-events: none; z-index: 0\"></div>",
                cover,
                bg.overlay_color(),
                rounded
            ));
        }
    }

    /// The per-element AI-assist action, editor only.
    fn assist_button(&mut self, kind: ElementKind, id: &str) {
        if self.surface.is_editor() {
            self.add_line(&format!(
                "<button type=\"button\" class=\"ai-assist\" data-kind=\"{}\" data-target=\"{}\">AI</button>",
                kind.name(),
                escape_text(id)
            ));
        }
    }

    fn markup(&mut self, markup: &str) {
        if !markup.is_empty() {
            self.add_line(markup);
        }
    }
}

/// Unquoted CSS `url()` argument.
fn css_url(url: &str) -> String {
    url.replace(' ', "%20")
        .replace('(', "%28")
        .replace(')', "%29")
        .replace('"', "%22")
        .replace('\'', "%27")
}

fn px(v: f64) -> String {
    format!("{}px", v)
}

fn money(currency: &str, v: f64) -> String {
    format!("{} {:.2}", currency, v)
}

/// Write `doc` for `surface`.
pub fn render_html(doc: &RenderDocument, surface: &Surface) -> String {
    let mut ctx = Context::new(surface);
    ctx.open(&format!(
        "<article class=\"proposal\" data-proposal=\"{}\">",
        escape_text(&doc.proposal_id)
    ));

    ctx.open("<header class=\"proposal-header\">");
    let title = ctx.open_box(
        "h1",
        "proposal-title",
        &doc.title_style,
        vec![],
        vec![],
        Some((ElementKind::DocumentTitle, doc.proposal_id.as_str())),
    );
    ctx.markup(&doc.title);
    ctx.assist_button(ElementKind::DocumentTitle, &doc.proposal_id);
    ctx.close_box(title);
    if !doc.client.is_empty() {
        ctx.add_line(&format!("<p class=\"proposal-client\">{}</p>", doc.client));
    }
    ctx.close("</header>");

    for section in &doc.sections {
        write_section(&mut ctx, section);
    }
    if let Some(pricing) = &doc.pricing {
        write_pricing(&mut ctx, pricing);
    }

    ctx.close("</article>");
    ctx.get_output()
}

fn write_section(ctx: &mut Context<'_>, section: &RenderSection) {
    ctx.open(&format!(
        "<section class=\"proposal-section\" data-section=\"{}\" style=\"margin-bottom: {}\">",
        escape_text(&section.id),
        px(section.gap_after)
    ));

    let title = ctx.open_box(
        "h2",
        "section-title",
        &section.title_style,
        vec![],
        vec![],
        Some((ElementKind::SectionTitle, section.id.as_str())),
    );
    ctx.markup(&section.title);
    ctx.assist_button(ElementKind::SectionTitle, &section.id);
    ctx.close_box(title);

    match &section.body {
        SectionBody::Single { style, markup } => {
            let content = ctx.open_box(
                "div",
                "section-content",
                style,
                vec![],
                vec![],
                Some((ElementKind::SectionContent, section.id.as_str())),
            );
            ctx.markup(markup);
            ctx.assist_button(ElementKind::SectionContent, &section.id);
            ctx.close_box(content);
        }
        SectionBody::Columns { gap, columns } => {
            ctx.open(&format!(
                "<div class=\"section-columns\" style=\"display: flex; gap: {}\">",
                px(*gap)
            ));
            for column in columns {
                let kind = ElementKind::Column(column.index);
                let open = ctx.open_box(
                    "div",
                    "section-column",
                    &column.style,
                    vec![("flex", "1 1 0".to_string()), ("min-width", "0".to_string())],
                    vec![],
                    Some((kind, column.id.as_str())),
                );
                ctx.markup(&column.markup);
                ctx.assist_button(kind, &column.id);
                ctx.close_box(open);
            }
            ctx.close("</div>");
        }
    }

    if !section.media.is_empty() {
        ctx.open("<div class=\"section-media\">");
        for media in &section.media {
            let src = escape_text(&media.url);
            match media.kind {
                MediaKind::Image => ctx.add_line(&format!(
                    "<img src=\"{}\" alt=\"\" style=\"max-width: 100%\">",
                    src
                )),
                MediaKind::Video => ctx.add_line(&format!(
                    "<video src=\"{}\" controls style=\"max-width: 100%\"></video>",
                    src
                )),
            }
        }
        ctx.close("</div>");
    }

    if let Some(canvas) = &section.canvas {
        write_canvas(ctx, canvas);
    }

    ctx.close("</section>");
}

fn write_canvas(ctx: &mut Context<'_>, canvas: &RenderCanvas) {
    ctx.open(&format!(
        "<div class=\"section-canvas\" style=\"position: relative; height: {}\">",
        px(canvas.height)
    ));
    for object in &canvas.objects {
        write_object(ctx, object);
    }
    ctx.close("</div>");
}

fn write_object(ctx: &mut Context<'_>, object: &RenderObject) {
    let b = object.bounds;
    let mut pre = vec![
        ("position", "absolute".to_string()),
        ("top", px(b.top)),
        ("left", px(b.left)),
        ("width", px(b.width)),
    ];
    if let Some(h) = b.height {
        pre.push(("height", px(h)));
    }
    pre.push(("box-sizing", "border-box".to_string()));

    let post = match &object.body {
        ObjectBody::Shape(ShapeType::Circle) => vec![("border-radius", "50%".to_string())],
        ObjectBody::Shape(ShapeType::Triangle) => {
            vec![("clip-path", "polygon(50% 0%, 100% 100%, 0% 100%)".to_string())]
        }
        ObjectBody::Image { .. } => vec![("overflow", "hidden".to_string())],
        _ => vec![],
    };

    let kind = match object.kind {
        CanvasKind::Shape => ElementKind::Shape,
        CanvasKind::Table => ElementKind::Table,
        CanvasKind::Text => ElementKind::Text,
        CanvasKind::Image => ElementKind::Image,
    };
    let class = format!("canvas-{}", object.kind.name());
    let open = ctx.open_box("div", &class, &object.style, pre, post, Some((kind, object.id.as_str())));

    match &object.body {
        ObjectBody::Shape(_) => {}
        ObjectBody::Table(rows) => {
            let cell_style = format!(
                "border: {}px solid {}; padding: 4px; vertical-align: top",
                object.style.border.width, object.style.border.color
            );
            ctx.open("<table style=\"width: 100%; height: 100%; border-collapse: collapse\">");
            for row in rows {
                ctx.open("<tr>");
                for cell in row {
                    ctx.add_line(&format!(
                        "<td style=\"{}\">{}</td>",
                        escape_text(&cell_style),
                        cell
                    ));
                }
                ctx.close("</tr>");
            }
            ctx.close("</table>");
        }
        ObjectBody::Text(markup) => {
            ctx.markup(markup);
            ctx.assist_button(kind, &object.id);
        }
        ObjectBody::Image { url, opacity } => {
            if !url.is_empty() {
                ctx.add_line(&format!(
                    "<img src=\"{}\" alt=\"\" style=\"display: block; width: 100%; height: 100%; object-fit: cover; opacity: {}\">",
                    escape_text(url),
                    opacity / 100.0
                ));
            }
        }
    }
    ctx.close_box(open);
}

fn write_pricing(ctx: &mut Context<'_>, pricing: &RenderPricing) {
    let cur = &pricing.currency;
    ctx.open("<section class=\"proposal-pricing\">");
    ctx.open("<table class=\"pricing-table\" style=\"width: 100%; border-collapse: collapse\">");
    ctx.add_line("<thead><tr><th>Item</th><th>Qty</th><th>Price</th><th>Amount</th></tr></thead>");
    ctx.open("<tbody>");
    for item in &pricing.items {
        ctx.add_line(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            item.label,
            item.qty,
            money(cur, item.price),
            money(cur, item.amount)
        ));
    }
    ctx.close("</tbody>");
    ctx.open("<tfoot>");
    ctx.add_line(&format!(
        "<tr><td colspan=\"3\">Subtotal</td><td>{}</td></tr>",
        money(cur, pricing.subtotal)
    ));
    if pricing.tax_rate != 0.0 {
        ctx.add_line(&format!(
            "<tr><td colspan=\"3\">Tax ({}%)</td><td>{}</td></tr>",
            pricing.tax_rate,
            money(cur, pricing.tax)
        ));
    }
    ctx.add_line(&format!(
        "<tr><td colspan=\"3\">Total</td><td>{}</td></tr>",
        money(cur, pricing.total)
    ));
    ctx.close("</tfoot>");
    ctx.close("</table>");
    ctx.close("</section>");
}

#[cfg(test)]
mod tests {
    use super::super::{prepare, Selection};
    use super::*;
    use crate::canvas::CanvasConfig;
    use crate::model::{Layout, Proposal, TextBox};
    use crate::mutate::{
        add_line_item, add_section, update_section_content, update_section_style, ContentTarget,
        StyleTarget,
    };
    use crate::style::{BorderSide, StyleBag};
    use crate::template::Variable;

    fn sample() -> Proposal {
        let p = add_section(&Proposal::new("Redesign", "Acme"), "Intro", Layout::Single);
        let id = p.sections[0].id.clone();
        let p = update_section_content(
            &p,
            &id,
            ContentTarget::Single,
            "<p>Hi {{Name}}</p><script>alert(1)</script>",
        )
        .unwrap();
        let p = update_section_style(
            &p,
            &id,
            StyleTarget::Content,
            &StyleBag {
                background_image: Some("https://cdn.test/bg.png".into()),
                background_opacity: Some(40.0),
                border_radius: Some(8.0),
                border_width: Some(2.0),
                border_color: Some("#111111".into()),
                border_style: Some(BorderSide::Bottom),
                ..Default::default()
            },
        )
        .unwrap();
        add_line_item(&p, "Design", 2.0, 150.0)
    }

    fn render(p: &Proposal, surface: &Surface) -> String {
        let vars = vec![Variable::new("Name", "Ava")];
        render_html(&prepare(p, &vars, &CanvasConfig::default()), surface)
    }

    #[test]
    fn modal_and_public_are_byte_identical() {
        let p = sample();
        assert_eq!(render(&p, &Surface::Modal), render(&p, &Surface::Public));
    }

    #[test]
    fn content_is_substituted_and_sanitized() {
        let html = render(&sample(), &Surface::Public);
        assert!(html.contains("<p>Hi Ava</p>"));
        assert!(!html.contains("script"));
        assert!(html.contains("border-bottom: 2px solid #111111"));
        assert!(html.contains("USD 300.00"));
    }

    #[test]
    fn editor_adds_affordances_only_for_selection() {
        let p = sample();
        let section_id = p.sections[0].id.clone();
        let editor = render(
            &p,
            &Surface::Editor(Selection::of(ElementKind::SectionContent, &section_id)),
        );
        let modal = render(&p, &Surface::Modal);
        assert!(editor.contains("data-select=\"section-content\""));
        assert!(editor.contains("data-selected=\"true\""));
        assert_eq!(editor.matches("data-selected").count(), 1);
        assert!(editor.contains("outline: 2px solid #3b82f6"));
        assert!(editor.contains("class=\"ai-assist\""));
        assert!(!modal.contains("data-select"));
        assert!(!modal.contains("ai-assist"));
        assert!(!modal.contains("outline"));
    }

    #[test]
    fn export_turns_background_css_into_img() {
        let p = sample();
        let public = render(&p, &Surface::Public);
        let export = render(&p, &Surface::Export);
        assert!(public.contains("background-image: url(https://cdn.test/bg.png)"));
        assert!(!export.contains("background-image:"));
        assert!(export.contains("<img class=\"background-image\" src=\"https://cdn.test/bg.png\""));
        for html in [&public, &export] {
            assert!(html.contains("background-color: rgba(255, 255, 255, 0.6); border-radius: 8px"));
        }
    }

    #[test]
    fn full_opacity_background_has_no_overlay() {
        let p = sample();
        let id = p.sections[0].id.clone();
        let p = update_section_style(
            &p,
            &id,
            StyleTarget::Content,
            &StyleBag {
                background_opacity: Some(100.0),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!render(&p, &Surface::Public).contains("background-overlay"));
    }

    #[test]
    fn auto_height_text_box_has_no_height() {
        let mut p = Proposal::new("t", "c");
        p = add_section(&p, "Canvas", Layout::Single);
        p.sections[0].texts.push(TextBox {
            id: "tb".into(),
            top: 350.0,
            left: 5.0,
            width: 200.0,
            height: None,
            content: "Note".into(),
            style: StyleBag::default(),
        });
        let html = render(&p, &Surface::Modal);
        assert!(html.contains("height: 470px"));
        assert!(html.contains("position: absolute; top: 350px; left: 5px; width: 200px; box-sizing: border-box"));
    }
}
