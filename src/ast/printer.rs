use crate::ast::*;

pub fn to_sexp(program: &Program) -> String {
    let mut buf = String::new();
    for decl in &program.declarations {
        sexp_decl(&mut buf, decl);
        buf.push('\n');
    }
    buf
}

pub fn to_json(program: &Program) -> serde_json::Result<String> {
    serde_json::to_string_pretty(program)
}

fn sexp_decl(buf: &mut String, decl: &Decl) {
    match decl {
        Decl::Define(d) => {
            buf.push_str("(define ");
            buf.push_str(&d.name);
            if let Some(ty) = d.type_annotation {
                buf.push_str(": ");
                buf.push_str(&ty.to_string());
            }
            buf.push(' ');
            sexp_expr(buf, &d.initializer);
            buf.push(')');
        }
        Decl::Statement(s) => sexp_stmt(buf, s),
    }
}

fn sexp_body(buf: &mut String, head: &str, body: &[Decl]) {
    buf.push('(');
    buf.push_str(head);
    for decl in body {
        buf.push(' ');
        sexp_decl(buf, decl);
    }
    buf.push(')');
}

fn sexp_stmt(buf: &mut String, stmt: &Stmt) {
    match stmt {
        Stmt::Print(p) => {
            buf.push_str("(print ");
            sexp_expr(buf, &p.expression);
            buf.push(')');
        }
        Stmt::Set(s) => {
            buf.push_str("(set ");
            buf.push_str(&s.name);
            buf.push(' ');
            sexp_expr(buf, &s.value);
            buf.push(')');
        }
        Stmt::Block(b) => sexp_body(buf, "block", &b.declarations),
        Stmt::If(i) => {
            buf.push_str("(if ");
            sexp_expr(buf, &i.condition);
            buf.push(' ');
            sexp_body(buf, "then", &i.then_branch);
            if let Some(ref else_branch) = i.else_branch {
                buf.push(' ');
                sexp_body(buf, "else", else_branch);
            }
            buf.push(')');
        }
        Stmt::While(w) => {
            buf.push_str("(while ");
            sexp_expr(buf, &w.condition);
            for decl in &w.body {
                buf.push(' ');
                sexp_decl(buf, decl);
            }
            buf.push(')');
        }
        Stmt::For(f) => {
            buf.push_str("(for ");
            buf.push_str(&f.variable);
            buf.push(' ');
            sexp_expr(buf, &f.start);
            buf.push(' ');
            sexp_expr(buf, &f.end);
            for decl in &f.body {
                buf.push(' ');
                sexp_decl(buf, decl);
            }
            buf.push(')');
        }
    }
}

fn sexp_expr(buf: &mut String, expr: &Expr) {
    match expr {
        Expr::Binary(b) => {
            buf.push('(');
            buf.push_str(&b.operator.to_string());
            buf.push(' ');
            sexp_expr(buf, &b.left);
            buf.push(' ');
            sexp_expr(buf, &b.right);
            buf.push(')');
        }
        Expr::Unary(u) => {
            buf.push('(');
            buf.push_str(&u.operator.to_string());
            buf.push(' ');
            sexp_expr(buf, &u.operand);
            buf.push(')');
        }
        Expr::Literal(l) => match &l.value {
            LiteralValue::Integer(n) => buf.push_str(&n.to_string()),
            LiteralValue::Float(n) => buf.push_str(&format!("{n:?}")),
            LiteralValue::String(s) => {
                buf.push('"');
                buf.push_str(s);
                buf.push('"');
            }
            LiteralValue::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
            LiteralValue::Nil => buf.push_str("nil"),
        },
        Expr::Grouping(g) => {
            buf.push_str("(group ");
            sexp_expr(buf, &g.expression);
            buf.push(')');
        }
        Expr::Variable(v) => buf.push_str(&v.name),
        Expr::Logical(l) => {
            buf.push('(');
            buf.push_str(&l.operator.to_string());
            buf.push(' ');
            sexp_expr(buf, &l.left);
            buf.push(' ');
            sexp_expr(buf, &l.right);
            buf.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(value: LiteralValue, offset: usize) -> Expr {
        Expr::Literal(LiteralExpr {
            value,
            span: Span::new(offset, 1, 1),
        })
    }

    #[test]
    fn sexp_binary_expression() {
        let program = Program {
            declarations: vec![Decl::Statement(Stmt::Print(PrintStmt {
                expression: Expr::Binary(BinaryExpr {
                    left: Box::new(literal(LiteralValue::Integer(1), 6)),
                    operator: BinaryOp::Add,
                    right: Box::new(Expr::Binary(BinaryExpr {
                        left: Box::new(literal(LiteralValue::Integer(2), 10)),
                        operator: BinaryOp::Multiply,
                        right: Box::new(literal(LiteralValue::Integer(3), 14)),
                        span: Span::new(10, 5, 1),
                    })),
                    span: Span::new(6, 9, 1),
                }),
                span: Span::new(0, 15, 1),
            }))],
        };
        let result = to_sexp(&program);
        assert_eq!(result.trim(), "(print (+ 1 (* 2 3)))");
    }

    #[test]
    fn sexp_control_flow() {
        let program = Program {
            declarations: vec![Decl::Statement(Stmt::If(IfStmt {
                condition: literal(LiteralValue::Bool(true), 3),
                then_branch: vec![Decl::Define(DefineDecl {
                    name: "x".to_string(),
                    type_annotation: Some(TypeName::U8),
                    initializer: literal(LiteralValue::Float(1.5), 20),
                    span: Span::new(8, 15, 1),
                })],
                else_branch: Some(vec![]),
                span: Span::new(0, 30, 1),
            }))],
        };
        assert_eq!(
            to_sexp(&program).trim(),
            "(if true (then (define x: u8 1.5)) (else))"
        );
    }

    #[test]
    fn json_output_is_valid() {
        let program = Program {
            declarations: vec![Decl::Define(DefineDecl {
                name: "x".to_string(),
                type_annotation: None,
                initializer: literal(LiteralValue::Integer(42), 11),
                span: Span::new(0, 13, 1),
            })],
        };
        let json = to_json(&program).expect("AST should be serializable");
        let parsed: serde_json::Value =
            serde_json::from_str(&json).expect("JSON output should be valid");
        assert_eq!(parsed["declarations"][0]["type"], "Define");
        assert_eq!(parsed["declarations"][0]["name"], "x");
    }
}
