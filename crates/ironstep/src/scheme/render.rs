//! Diagram output for schemes.

use super::{ActivityDef, Scheme, Target};

impl Scheme {
    /// Generate a Mermaid state diagram.
    ///
    /// Composite activities become nested states; terminal points render as
    /// `[*]`.
    ///
    /// # Example Output
    ///
    /// ```text
    /// stateDiagram-v2
    ///     [*] --> Approval
    ///     state Approval {
    ///         [*] --> Review
    ///         Review --> Notify : Approved
    ///         Review --> [*] : Rejected
    ///         Notify --> [*]
    ///     }
    ///     Approval --> [*]
    /// ```
    pub fn to_mermaid(&self) -> String {
        let root = self.root();
        let mut lines = vec!["stateDiagram-v2".to_string()];
        lines.push(format!("    [*] --> {}", root.name()));
        self.mermaid_activity(root, 1, &mut lines);
        lines.push(format!("    {} --> [*]", root.name()));
        lines.join("\n")
    }

    fn mermaid_activity(&self, activity: &ActivityDef, depth: usize, lines: &mut Vec<String>) {
        if !activity.is_composite() {
            return;
        }
        let indent = "    ".repeat(depth);
        let inner = "    ".repeat(depth + 1);

        lines.push(format!("{indent}state {} {{", activity.name()));
        if let Some(start) = activity.start() {
            lines.push(format!("{inner}[*] --> {}", self.activity(start).name()));
        }
        for child in self.children(activity.id()) {
            self.mermaid_activity(child, depth + 1, lines);
            if child.is_terminal() {
                lines.push(format!("{inner}{} --> [*]", child.name()));
            }
            for t in child.transitions() {
                let target = match t.target {
                    Target::Activity(id) => self.activity(id).name(),
                    Target::End => "[*]",
                };
                lines.push(format!("{inner}{} --> {target} : {}", child.name(), t.key));
            }
        }
        lines.push(format!("{indent}}}"));
    }

    /// Generate a DOT graph for Graphviz.
    ///
    /// Each composite activity becomes a cluster with its own start point
    /// and end marker.
    ///
    /// # Example Output
    ///
    /// ```text
    /// digraph workflow {
    ///     rankdir=LR;
    ///     node [shape=box];
    ///
    ///     subgraph cluster_Approval {
    ///         label="Approval";
    ///         "Approval.start" [shape=point];
    ///         "Approval.end" [shape=doublecircle, label=""];
    ///         "Review";
    ///     }
    ///     "Approval.start" -> "Review";
    ///     "Review" -> "Approval.end" [label="Rejected"];
    /// }
    /// ```
    pub fn to_dot(&self) -> String {
        let mut lines = vec![
            "digraph workflow {".to_string(),
            "    rankdir=LR;".to_string(),
            "    node [shape=box];".to_string(),
            String::new(),
        ];
        let mut edges = Vec::new();

        let root = self.root();
        if root.is_composite() {
            self.dot_cluster(root, 1, &mut lines, &mut edges);
        } else {
            lines.push(format!("    \"{}\";", root.name()));
        }

        lines.extend(edges);
        lines.push("}".to_string());
        lines.join("\n")
    }

    fn dot_cluster(
        &self,
        activity: &ActivityDef,
        depth: usize,
        lines: &mut Vec<String>,
        edges: &mut Vec<String>,
    ) {
        let indent = "    ".repeat(depth);
        let inner = "    ".repeat(depth + 1);
        let name = activity.name();

        lines.push(format!("{indent}subgraph \"cluster_{name}\" {{"));
        lines.push(format!("{inner}label=\"{name}\";"));
        lines.push(format!("{inner}\"{name}.start\" [shape=point];"));
        lines.push(format!("{inner}\"{name}.end\" [shape=doublecircle, label=\"\"];"));

        if let Some(start) = activity.start() {
            edges.push(format!("    \"{name}.start\" -> \"{}\";", self.activity(start).name()));
        }

        for child in self.children(activity.id()) {
            if child.is_composite() {
                self.dot_cluster(child, depth + 1, lines, edges);
                edges.push(format!("    \"{}.end\" -> \"{}\";", child.name(), child.name()));
            } else {
                lines.push(format!("{inner}\"{}\";", child.name()));
            }
            if child.is_terminal() {
                edges.push(format!("    \"{}\" -> \"{name}.end\";", child.name()));
            }
            for t in child.transitions() {
                let target = match t.target {
                    Target::Activity(id) => self.activity(id).name().to_string(),
                    Target::End => format!("{name}.end"),
                };
                edges.push(format!(
                    "    \"{}\" -> \"{target}\" [label=\"{}\"];",
                    child.name(),
                    t.key
                ));
            }
        }

        lines.push(format!("{indent}}}"));
    }
}
