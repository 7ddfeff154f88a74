//! Read-only SQL statement guard.
//!
//! This module decides whether a submitted SQL text is a single, read-only,
//! fully-qualified statement, and extracts the table references it mentions
//! so the router can check them against the scope allow-list.
//!
//! The guard is deliberately a lexical/structural check, not a SQL parser:
//! it tokenizes the text with awareness of string literals, quoted
//! identifiers, and `--`/block comments, then inspects the token stream.
//! Syntax beyond these checks is left to the warehouse engine. Tokenizing
//! before keyword matching matters for correctness both ways: a keyword
//! inside a string literal must not trigger a rejection, and a mutating
//! keyword hidden behind a comment must not slip through.

use crate::models::TableIdentifier;
use std::collections::BTreeSet;

/// Verdict from the guard: either a pass-through candidate carrying the
/// referenced tables in order of first appearance (duplicates included), or
/// a structural rejection with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Candidate { tables: Vec<TableIdentifier> },
    Rejected { reason: String },
}

impl GuardVerdict {
    fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Bare or quoted identifier/keyword. `value` has quoting stripped.
    Ident { value: String, quoted: bool },
    /// Numeric literal
    Number,
    /// String literal (contents are irrelevant to the guard)
    StringLit,
    /// Any single punctuation or operator character
    Punct(char),
}

impl Token {
    /// Uppercased value of a bare (unquoted) identifier, or None.
    fn keyword(&self) -> Option<String> {
        match self {
            Token::Ident {
                value,
                quoted: false,
            } => Some(value.to_ascii_uppercase()),
            _ => None,
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        self.keyword().is_some_and(|k| k == kw)
    }
}

/// Tokenize SQL text, skipping whitespace and comments and collapsing
/// string literals to single tokens. Returns an error message for
/// unterminated literals or comments.
fn tokenize(sql: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Line comment: -- to end of line
        if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        // Block comment: /* ... */, nestable (PostgreSQL semantics)
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            let mut depth = 1;
            i += 2;
            while i < chars.len() && depth > 0 {
                if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                    depth += 1;
                    i += 2;
                } else if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    depth -= 1;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            if depth > 0 {
                return Err("unterminated block comment".to_string());
            }
            continue;
        }

        // String literal: '...' with '' as escaped quote
        if c == '\'' {
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err("unterminated string literal".to_string()),
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => i += 2,
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(_) => i += 1,
                }
            }
            tokens.push(Token::StringLit);
            continue;
        }

        // Quoted identifier: "..." (standard) or `...` (BigQuery/MySQL style)
        if c == '"' || c == '`' {
            let quote = c;
            let mut value = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(format!("unterminated quoted identifier ({quote}...)")),
                    Some(&q) if q == quote && chars.get(i + 1) == Some(&quote) => {
                        value.push(quote);
                        i += 2;
                    }
                    Some(&q) if q == quote => {
                        i += 1;
                        break;
                    }
                    Some(&other) => {
                        value.push(other);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Ident {
                value,
                quoted: true,
            });
            continue;
        }

        // Bare identifier or keyword
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Ident {
                value: chars[start..i].iter().collect(),
                quoted: false,
            });
            continue;
        }

        // Numeric literal (digits, optional fraction/exponent)
        if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if matches!(chars.get(i), Some('e') | Some('E')) {
                i += 1;
                if matches!(chars.get(i), Some('+') | Some('-')) {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            tokens.push(Token::Number);
            continue;
        }

        tokens.push(Token::Punct(c));
        i += 1;
    }

    Ok(tokens)
}

// =============================================================================
// Statement classification
// =============================================================================

/// Keywords that introduce an expression-level FROM inside a function call,
/// e.g. `EXTRACT(YEAR FROM ts)`. A FROM under one of these openers is not a
/// table-source introducer.
const EXPRESSION_FROM_FUNCS: &[&str] = &["EXTRACT", "SUBSTRING", "TRIM", "POSITION", "OVERLAY"];

/// Clause keywords that terminate a FROM table-source list at their depth.
/// ON is deliberately absent: a comma after a join's ON condition at the
/// same depth is still a cross-join table source (commas inside the ON
/// expression itself only occur at deeper paren depths).
const FROM_TERMINATORS: &[&str] = &[
    "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "FETCH", "WINDOW", "UNION",
    "INTERSECT", "EXCEPT", "SELECT", "QUALIFY",
];

/// Evaluate a SQL text: single statement, read-only, fully qualified.
///
/// Pure function over the text; evaluating the same input twice yields the
/// same verdict.
pub fn evaluate(sql: &str) -> GuardVerdict {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return GuardVerdict::rejected("empty statement");
    }

    let mut tokens = match tokenize(trimmed) {
        Ok(tokens) => tokens,
        Err(reason) => return GuardVerdict::rejected(reason),
    };

    // Single-statement check: a semicolon is only acceptable as the very
    // last token. Anything after one means a second statement was smuggled
    // behind a benign leading SELECT.
    if let Some(pos) = tokens.iter().position(|t| *t == Token::Punct(';')) {
        if pos != tokens.len() - 1 {
            return GuardVerdict::rejected("multiple statements are not allowed");
        }
        tokens.pop();
    }
    if tokens.is_empty() {
        return GuardVerdict::rejected("empty statement");
    }

    // Statement-kind check on the leading keyword. Parenthesized SELECTs
    // are permitted, so skip leading open parens.
    let first = tokens.iter().position(|t| *t != Token::Punct('('));
    let Some(first) = first else {
        return GuardVerdict::rejected("empty statement");
    };
    let leading = match tokens[first].keyword() {
        Some(kw) => kw,
        None => return GuardVerdict::rejected("statement must begin with SELECT or WITH"),
    };

    let mut cte_names: Vec<String> = Vec::new();
    match leading.as_str() {
        "SELECT" => {}
        "WITH" => {
            // The CTE prologue is permitted, but the terminal statement must
            // still be a SELECT.
            if let Err(reason) = check_with_prologue(&tokens, first + 1, &mut cte_names) {
                return GuardVerdict::rejected(reason);
            }
        }
        other => {
            return GuardVerdict::rejected(format!("non-read-only statement: {other}"));
        }
    }

    match extract_references(&tokens, &cte_names) {
        Ok(tables) => GuardVerdict::Candidate { tables },
        Err(reason) => GuardVerdict::rejected(reason),
    }
}

/// Walk a WITH prologue starting just after the WITH keyword: collect the
/// declared CTE names, verify every CTE body is itself read-only, and
/// verify the terminal statement is a SELECT.
fn check_with_prologue(
    tokens: &[Token],
    mut i: usize,
    cte_names: &mut Vec<String>,
) -> Result<(), String> {
    if tokens.get(i).is_some_and(|t| t.is_keyword("RECURSIVE")) {
        i += 1;
    }

    loop {
        // CTE name
        let Some(Token::Ident { value, .. }) = tokens.get(i) else {
            return Err("malformed common table expression".to_string());
        };
        cte_names.push(value.clone());
        i += 1;

        // Optional column list before AS
        if tokens.get(i) == Some(&Token::Punct('(')) {
            i = skip_parens(tokens, i)?;
        }

        if !tokens.get(i).is_some_and(|t| t.is_keyword("AS")) {
            return Err("malformed common table expression".to_string());
        }
        i += 1;

        // Optional [NOT] MATERIALIZED
        if tokens.get(i).is_some_and(|t| t.is_keyword("NOT")) {
            i += 1;
        }
        if tokens.get(i).is_some_and(|t| t.is_keyword("MATERIALIZED")) {
            i += 1;
        }

        if tokens.get(i) != Some(&Token::Punct('(')) {
            return Err("malformed common table expression".to_string());
        }
        // PostgreSQL allows INSERT/UPDATE/DELETE as CTE bodies; the body's
        // own leading keyword must be checked or a mutation rides in on a
        // SELECT terminal.
        check_cte_body(tokens, i + 1, cte_names)?;
        i = skip_parens(tokens, i)?;

        if tokens.get(i) == Some(&Token::Punct(',')) {
            i += 1;
            continue;
        }
        break;
    }

    // Terminal statement after the CTE list
    match tokens.get(i).and_then(Token::keyword) {
        Some(kw) if kw == "SELECT" => Ok(()),
        Some(kw) => Err(format!("non-read-only statement: {kw}")),
        None if tokens.get(i) == Some(&Token::Punct('(')) => {
            // Parenthesized terminal SELECT
            match tokens.get(i + 1).and_then(Token::keyword) {
                Some(kw) if kw == "SELECT" => Ok(()),
                _ => Err("common table expression must terminate in a SELECT".to_string()),
            }
        }
        None => Err("common table expression must terminate in a SELECT".to_string()),
    }
}

/// Check the leading keyword of one CTE body, with `i` just inside the
/// body's open paren. SELECT and VALUES bodies are read-only; a WITH body
/// recurses so nested prologues get the same treatment (and contribute
/// their CTE names); anything else is a mutation and rejected.
fn check_cte_body(
    tokens: &[Token],
    mut i: usize,
    cte_names: &mut Vec<String>,
) -> Result<(), String> {
    while tokens.get(i) == Some(&Token::Punct('(')) {
        i += 1;
    }
    match tokens.get(i).and_then(Token::keyword) {
        Some(kw) if kw == "SELECT" || kw == "VALUES" => Ok(()),
        Some(kw) if kw == "WITH" => check_with_prologue(tokens, i + 1, cte_names),
        Some(kw) => Err(format!("non-read-only statement: {kw}")),
        None => Err("malformed common table expression".to_string()),
    }
}

/// Advance past a balanced parenthesized group starting at an open paren.
/// Returns the index just after the matching close paren.
fn skip_parens(tokens: &[Token], open: usize) -> Result<usize, String> {
    debug_assert_eq!(tokens.get(open), Some(&Token::Punct('(')));
    let mut depth = 0usize;
    let mut i = open;
    while i < tokens.len() {
        match tokens[i] {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err("unbalanced parentheses".to_string())
}

// =============================================================================
// Reference extraction
// =============================================================================

/// Scan the token stream for table references after FROM/JOIN, including
/// inside subqueries and CTE bodies (the stream is walked flat, so nested
/// SELECTs contribute their references transitively). Every reference must
/// be fully qualified; the only exception is a bare name that matches a
/// declared CTE.
fn extract_references(
    tokens: &[Token],
    cte_names: &[String],
) -> Result<Vec<TableIdentifier>, String> {
    let mut refs = Vec::new();
    // Uppercased word immediately before each currently-open paren.
    let mut paren_openers: Vec<Option<String>> = Vec::new();
    // Paren depths at which a FROM table-source list is active, so that a
    // comma at that depth introduces another table source.
    let mut from_depths: BTreeSet<usize> = BTreeSet::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Punct('(') => {
                let opener = if i > 0 { tokens[i - 1].keyword() } else { None };
                paren_openers.push(opener);
                i += 1;
            }
            Token::Punct(')') => {
                if paren_openers.pop().is_none() {
                    return Err("unbalanced parentheses".to_string());
                }
                let depth = paren_openers.len();
                from_depths.retain(|&d| d <= depth);
                i += 1;
            }
            Token::Punct(',') if from_depths.contains(&paren_openers.len()) => {
                i = consume_table_source(
                    tokens,
                    i + 1,
                    paren_openers.len(),
                    cte_names,
                    &mut refs,
                    &mut from_depths,
                )?;
            }
            token => {
                match token.keyword().as_deref() {
                    Some("FROM") => {
                        let in_expression_func = paren_openers
                            .last()
                            .is_some_and(|opener| {
                                opener
                                    .as_deref()
                                    .is_some_and(|o| EXPRESSION_FROM_FUNCS.contains(&o))
                            });
                        if in_expression_func {
                            i += 1;
                        } else {
                            from_depths.insert(paren_openers.len());
                            i = consume_table_source(
                                tokens,
                                i + 1,
                                paren_openers.len(),
                                cte_names,
                                &mut refs,
                                &mut from_depths,
                            )?;
                        }
                    }
                    Some("JOIN") => {
                        i = consume_table_source(
                            tokens,
                            i + 1,
                            paren_openers.len(),
                            cte_names,
                            &mut refs,
                            &mut from_depths,
                        )?;
                    }
                    Some(kw) if FROM_TERMINATORS.contains(&kw) => {
                        from_depths.remove(&paren_openers.len());
                        i += 1;
                    }
                    _ => i += 1,
                }
            }
        }
    }

    if !paren_openers.is_empty() {
        return Err("unbalanced parentheses".to_string());
    }
    Ok(refs)
}

/// Consume one table source starting at `i`: a dotted identifier chain, a
/// table function call, a LATERAL-prefixed source, or a parenthesized
/// subquery (left in place for the main walk). `depth` is the paren depth
/// at `i`. Returns the index to resume the walk from.
fn consume_table_source(
    tokens: &[Token],
    i: usize,
    depth: usize,
    cte_names: &[String],
    refs: &mut Vec<TableIdentifier>,
    from_depths: &mut BTreeSet<usize>,
) -> Result<usize, String> {
    match tokens.get(i) {
        None => Err("missing table reference after FROM/JOIN".to_string()),
        Some(Token::Punct('(')) => {
            // Distinguish a subquery or VALUES list (the main walk descends
            // into it on its own) from a parenthesized join, whose operands
            // never sit behind a FROM/JOIN keyword. For the join case the
            // inner depths are marked as table-source lists so cross-join
            // commas inside the group are consumed too.
            let mut k = i;
            while tokens.get(k) == Some(&Token::Punct('(')) {
                k += 1;
            }
            match tokens.get(k).and_then(Token::keyword) {
                Some(kw) if kw == "SELECT" || kw == "WITH" || kw == "VALUES" => Ok(i),
                _ => {
                    for d in depth + 1..=depth + (k - i) {
                        from_depths.insert(d);
                    }
                    consume_table_source(tokens, k, depth + (k - i), cte_names, refs, from_depths)?;
                    Ok(i)
                }
            }
        }
        Some(Token::Ident { .. }) if tokens[i].is_keyword("LATERAL") => {
            consume_table_source(tokens, i + 1, depth, cte_names, refs, from_depths)
        }
        Some(Token::Ident { .. }) => {
            // Collect the dotted chain: ident ('.' ident)*
            let mut parts: Vec<String> = Vec::new();
            let mut j = i;
            loop {
                match tokens.get(j) {
                    Some(Token::Ident { value, .. }) => parts.push(value.clone()),
                    _ => {
                        return Err(format!(
                            "unqualified table reference: {}",
                            parts.join(".")
                        ));
                    }
                }
                j += 1;
                if tokens.get(j) == Some(&Token::Punct('.')) {
                    j += 1;
                } else {
                    break;
                }
            }

            // A chain immediately followed by '(' is a table function
            // (unnest, generate_series, ...), not a table reference.
            if tokens.get(j) == Some(&Token::Punct('(')) {
                return Ok(j);
            }

            match parts.len() {
                3 => {
                    let ident =
                        TableIdentifier::new(parts[0].clone(), parts[1].clone(), parts[2].clone())
                            .map_err(|_| {
                                format!("malformed table reference: {}", parts.join("."))
                            })?;
                    refs.push(ident);
                    Ok(j)
                }
                1 if cte_names
                    .iter()
                    .any(|cte| cte.eq_ignore_ascii_case(&parts[0])) =>
                {
                    Ok(j)
                }
                1 | 2 => Err(format!("unqualified table reference: {}", parts.join("."))),
                _ => Err(format!("malformed table reference: {}", parts.join("."))),
            }
        }
        Some(_) => Err("unqualified table reference after FROM/JOIN".to_string()),
    }
}
