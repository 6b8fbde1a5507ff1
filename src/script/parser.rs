//! Builds the syntax tree from the pest grammar in `script.pest`.

use std::sync::Arc;

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;

use super::ast::{BinOp, ClassDecl, Expr, FnDecl, Param, Stmt, Target};
use crate::error::EvalError;

#[derive(Parser)]
#[grammar = "script/script.pest"]
pub struct ScriptParser;

type Built<T> = Result<T, EvalError>;

pub fn parse_program(code: &str) -> Built<Vec<Stmt>> {
    let mut pairs = ScriptParser::parse(Rule::program, code)
        .map_err(|e| EvalError::new(format!("SyntaxError: {e}")))?;
    let program = pairs
        .next()
        .ok_or_else(|| EvalError::new("SyntaxError: empty parse"))?;
    significant(program.into_inner())
        .filter(|pair| pair.as_rule() != Rule::EOI)
        .map(build_stmt)
        .collect()
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_fn
            | Rule::kw_class
            | Rule::kw_import
            | Rule::kw_from
            | Rule::kw_as
            | Rule::kw_del
            | Rule::kw_return
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_slots
            | Rule::kw_and
            | Rule::kw_or
            | Rule::kw_not
    )
}

// Children of a pair without the keyword tokens.
fn significant(pairs: Pairs<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pairs.filter(|pair| !is_keyword(pair.as_rule()))
}

fn malformed(pair: &Pair<'_, Rule>) -> EvalError {
    EvalError::new(format!(
        "SyntaxError: unexpected {:?} at {:?}",
        pair.as_rule(),
        pair.line_col()
    ))
}

fn missing(what: &str) -> EvalError {
    EvalError::new(format!("SyntaxError: missing {what}"))
}

fn build_block(pair: Pair<'_, Rule>) -> Built<Vec<Stmt>> {
    significant(pair.into_inner()).map(build_stmt).collect()
}

fn build_stmt(pair: Pair<'_, Rule>) -> Built<Stmt> {
    let rule = pair.as_rule();
    let mut inner = significant(pair.clone().into_inner());
    let stmt = match rule {
        Rule::fn_def => Stmt::FnDef(Arc::new(build_fn(inner)?)),
        Rule::class_def => {
            let name = inner.next().ok_or_else(|| missing("class name"))?.as_str().to_owned();
            let mut bases = Vec::new();
            let mut body = Vec::new();
            for part in inner {
                match part.as_rule() {
                    Rule::bases => {
                        bases = part.into_inner().map(build_expr).collect::<Built<_>>()?;
                    }
                    Rule::block => body = build_block(part)?,
                    _ => return Err(malformed(&part)),
                }
            }
            Stmt::ClassDef(Arc::new(ClassDecl { name, bases, body }))
        }
        Rule::import_stmt => {
            let module = inner.next().ok_or_else(|| missing("module name"))?.as_str().to_owned();
            let alias = inner.next().map(|p| p.as_str().to_owned());
            Stmt::Import { module, alias }
        }
        Rule::import_from => {
            let module = inner.next().ok_or_else(|| missing("module name"))?.as_str().to_owned();
            let names = inner
                .map(|name| {
                    let mut parts = significant(name.into_inner());
                    let original = parts.next().ok_or_else(|| missing("imported name"))?;
                    Ok((original.as_str().to_owned(), parts.next().map(|p| p.as_str().to_owned())))
                })
                .collect::<Built<_>>()?;
            Stmt::ImportFrom { module, names }
        }
        Rule::del_stmt => {
            let target = inner.next().ok_or_else(|| missing("del target"))?;
            Stmt::Del(build_target(target)?)
        }
        Rule::return_stmt => Stmt::Return(inner.next().map(build_expr).transpose()?),
        Rule::if_stmt => build_if(inner)?,
        Rule::slots_decl => Stmt::Slots(inner.map(|p| p.as_str().to_owned()).collect()),
        Rule::assign => {
            let target = inner.next().ok_or_else(|| missing("assignment target"))?;
            let value = inner.next().ok_or_else(|| missing("assigned value"))?;
            Stmt::Assign {
                target: build_target(target)?,
                value: build_expr(value)?,
            }
        }
        Rule::expr_stmt => {
            Stmt::Expr(build_expr(inner.next().ok_or_else(|| missing("expression"))?)?)
        }
        _ => return Err(malformed(&pair)),
    };
    Ok(stmt)
}

fn build_fn<'i>(mut inner: impl Iterator<Item = Pair<'i, Rule>>) -> Built<FnDecl> {
    let name = inner.next().ok_or_else(|| missing("function name"))?.as_str().to_owned();
    let mut params = Vec::new();
    let mut body = Vec::new();
    for part in inner {
        match part.as_rule() {
            Rule::params => {
                for param in part.into_inner() {
                    let mut pieces = param.into_inner();
                    let name = pieces.next().ok_or_else(|| missing("parameter name"))?;
                    params.push(Param {
                        name: name.as_str().to_owned(),
                        default: pieces.next().map(build_expr).transpose()?,
                    });
                }
            }
            Rule::block => body = build_block(part)?,
            _ => return Err(malformed(&part)),
        }
    }
    Ok(FnDecl { name, params, body })
}

fn build_if<'i>(mut inner: impl Iterator<Item = Pair<'i, Rule>>) -> Built<Stmt> {
    let cond = build_expr(inner.next().ok_or_else(|| missing("condition"))?)?;
    let then = build_block(inner.next().ok_or_else(|| missing("if block"))?)?;
    let otherwise = match inner.next() {
        Some(part) if part.as_rule() == Rule::if_stmt => {
            Some(vec![build_if(significant(part.into_inner()))?])
        }
        Some(part) => Some(build_block(part)?),
        None => None,
    };
    Ok(Stmt::If {
        cond,
        then,
        otherwise,
    })
}

fn build_target(pair: Pair<'_, Rule>) -> Built<Target> {
    let text = pair.as_str().to_owned();
    match build_expr(pair)? {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Attr(object, name) => Ok(Target::Attr(*object, name)),
        _ => Err(EvalError::new(format!("SyntaxError: cannot assign to '{text}'"))),
    }
}

fn build_expr(pair: Pair<'_, Rule>) -> Built<Expr> {
    let rule = pair.as_rule();
    match rule {
        Rule::expr => {
            let inner = pair.clone().into_inner().next().ok_or_else(|| malformed(&pair))?;
            build_expr(inner)
        }
        Rule::or_expr | Rule::and_expr => {
            let mut operands = significant(pair.into_inner()).map(build_expr);
            let first = operands.next().ok_or_else(|| missing("operand"))??;
            operands.try_fold(first, |lhs, rhs| {
                let rhs = Box::new(rhs?);
                Ok(if rule == Rule::or_expr {
                    Expr::Or(Box::new(lhs), rhs)
                } else {
                    Expr::And(Box::new(lhs), rhs)
                })
            })
        }
        Rule::not_expr => {
            let inner = significant(pair.clone().into_inner())
                .next()
                .ok_or_else(|| malformed(&pair))?;
            if inner.as_rule() == Rule::not_expr {
                Ok(Expr::Not(Box::new(build_expr(inner)?)))
            } else {
                build_expr(inner)
            }
        }
        Rule::comparison => {
            let mut inner = pair.into_inner();
            let lhs = build_expr(inner.next().ok_or_else(|| missing("operand"))?)?;
            match (inner.next(), inner.next()) {
                (Some(op), Some(rhs)) => {
                    let op = match op.as_str() {
                        "==" => BinOp::Eq,
                        "!=" => BinOp::Ne,
                        "<=" => BinOp::Le,
                        ">=" => BinOp::Ge,
                        "<" => BinOp::Lt,
                        _ => BinOp::Gt,
                    };
                    Ok(Expr::Binary(op, Box::new(lhs), Box::new(build_expr(rhs)?)))
                }
                _ => Ok(lhs),
            }
        }
        Rule::sum => {
            let mut inner = pair.into_inner();
            let mut lhs = build_expr(inner.next().ok_or_else(|| missing("operand"))?)?;
            while let (Some(op), Some(rhs)) = (inner.next(), inner.next()) {
                let op = if op.as_str() == "+" { BinOp::Add } else { BinOp::Sub };
                lhs = Expr::Binary(op, Box::new(lhs), Box::new(build_expr(rhs)?));
            }
            Ok(lhs)
        }
        Rule::postfix => {
            let mut inner = pair.into_inner();
            let mut expr = build_expr(inner.next().ok_or_else(|| missing("expression"))?)?;
            for suffix in inner {
                expr = match suffix.as_rule() {
                    Rule::attr => {
                        let name = suffix.into_inner().next().ok_or_else(|| missing("attribute"))?;
                        Expr::Attr(Box::new(expr), name.as_str().to_owned())
                    }
                    Rule::call => build_call(expr, suffix)?,
                    _ => return Err(malformed(&suffix)),
                };
            }
            Ok(expr)
        }
        Rule::int => pair
            .as_str()
            .parse::<i64>()
            .map(Expr::Int)
            .map_err(|_| EvalError::new(format!("SyntaxError: integer literal {} is out of range", pair.as_str()))),
        Rule::string => Ok(Expr::Str(unescape(pair.as_str()))),
        Rule::true_lit => Ok(Expr::Bool(true)),
        Rule::false_lit => Ok(Expr::Bool(false)),
        Rule::nil_lit => Ok(Expr::Nil),
        Rule::list => Ok(Expr::List(
            pair.into_inner().map(build_expr).collect::<Built<_>>()?,
        )),
        Rule::ident => Ok(Expr::Name(pair.as_str().to_owned())),
        _ => Err(malformed(&pair)),
    }
}

fn build_call(callee: Expr, pair: Pair<'_, Rule>) -> Built<Expr> {
    let mut args = Vec::new();
    let mut kwargs = Vec::new();
    for arg in pair.into_inner() {
        if arg.as_rule() == Rule::kwarg {
            let mut parts = arg.into_inner();
            let name = parts.next().ok_or_else(|| missing("keyword name"))?;
            let value = parts.next().ok_or_else(|| missing("keyword value"))?;
            kwargs.push((name.as_str().to_owned(), build_expr(value)?));
        } else {
            if !kwargs.is_empty() {
                return Err(EvalError::new(
                    "SyntaxError: positional argument follows keyword argument",
                ));
            }
            args.push(build_expr(arg)?);
        }
    }
    Ok(Expr::Call {
        callee: Box::new(callee),
        args,
        kwargs,
    })
}

// Strips the quotes and resolves backslash escapes.
fn unescape(literal: &str) -> String {
    let body = &literal[1..literal.len() - 1];
    let mut text = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some('r') => text.push('\r'),
            Some('0') => text.push('\0'),
            Some(other) => text.push(other),
            None => text.push('\\'),
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_class_with_methods() {
        let program = parse_program(
            "class Foo(Base) {\n  attr = 'new'\n  slots a, b\n  fn get(self) { return \"new foo\" }\n}\n",
        )
        .expect("parses");
        assert_eq!(program.len(), 1);
        let Stmt::ClassDef(class) = &program[0] else {
            panic!("expected a class, got {program:?}");
        };
        assert_eq!(class.name, "Foo");
        assert_eq!(class.bases, vec![Expr::Name("Base".into())]);
        assert_eq!(class.body.len(), 3);
        assert_eq!(class.body[1], Stmt::Slots(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn parses_imports_and_semicolons() {
        let program = parse_program("import foo as f; from foo import get, Foo as F").expect("parses");
        assert_eq!(
            program,
            vec![
                Stmt::Import { module: "foo".into(), alias: Some("f".into()) },
                Stmt::ImportFrom {
                    module: "foo".into(),
                    names: vec![("get".into(), None), ("Foo".into(), Some("F".into()))],
                },
            ]
        );
    }

    #[test]
    fn keyword_prefixed_identifiers_are_names() {
        let program = parse_program("fnord = iffy + nothing").expect("parses");
        assert_eq!(
            program,
            vec![Stmt::Assign {
                target: Target::Name("fnord".into()),
                value: Expr::Binary(
                    BinOp::Add,
                    Box::new(Expr::Name("iffy".into())),
                    Box::new(Expr::Name("nothing".into()))
                ),
            }]
        );
    }

    #[test]
    fn calls_with_keywords_and_attributes() {
        let program = parse_program("obj.set(1, attr='x') == nil").expect("parses");
        let Stmt::Expr(Expr::Binary(BinOp::Eq, lhs, _)) = &program[0] else {
            panic!("expected a comparison, got {program:?}");
        };
        let Expr::Call { callee, args, kwargs } = lhs.as_ref() else {
            panic!("expected a call");
        };
        assert_eq!(**callee, Expr::Attr(Box::new(Expr::Name("obj".into())), "set".into()));
        assert_eq!(args, &vec![Expr::Int(1)]);
        assert_eq!(kwargs, &vec![("attr".to_string(), Expr::Str("x".into()))]);
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_program("fn (").unwrap_err();
        assert!(err.message().starts_with("SyntaxError"));
    }

    #[test]
    fn comments_and_blank_lines() {
        let program = parse_program("\n# leading\nx = 1  # trailing\n\n\ny = 'a\\nb'\n").expect("parses");
        assert_eq!(program.len(), 2);
        assert_eq!(
            program[1],
            Stmt::Assign { target: Target::Name("y".into()), value: Expr::Str("a\nb".into()) }
        );
    }
}
