//! Box-drawing text rendering of node trees.

/// Child printer: receives the indentation its own children must use.
pub type PrintChild<'a> = dyn Fn(&str) -> String + 'a;

/// Something that renders itself below the given indentation.
pub trait Printable {
    fn to_string_with_tab(&self, tab: &str) -> String;
}

/// Renders `children` as branches below a parent line, one line per child.
pub fn print_tree(tab: &str, children: &[&PrintChild<'_>]) -> String {
    let mut out = String::new();
    let Some(last) = children.len().checked_sub(1) else {
        return out;
    };

    for (i, child_fn) in children.iter().enumerate() {
        let is_last = i == last;
        let child_tab = format!("{tab}{}  ", if is_last { " " } else { "│" });
        let child = child_fn(&child_tab);
        let branch = if child.is_empty() {
            "│"
        } else if is_last {
            "└─"
        } else {
            "├─"
        };

        out.push('\n');
        out.push_str(tab);
        out.push_str(branch);
        if !child.is_empty() {
            out.push(' ');
            out.push_str(&child);
        }
    }

    out
}
