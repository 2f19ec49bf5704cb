use expr::Expr;

/// Render a plan as an indented operator tree, one node per line.
pub fn explain(plan: &Expr) -> String {
    let mut out = String::new();
    walk(plan, 0, &mut out);
    out
}

fn walk(node: &Expr, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(&node.to_string());
    out.push('\n');
    for child in node.rel_children() {
        walk(child, depth + 1, out);
    }
}
