//! Embedded SPARQL 1.0 parser.
//!
//! Supports the SELECT/ASK subset the engine evaluates: prologue, basic
//! graph patterns with `;`/`,` abbreviations, FILTER, OPTIONAL, UNION,
//! nested groups, DISTINCT, ORDER BY, LIMIT and OFFSET.

pub mod ast;
pub mod lexer;
pub mod parser;

use castor_common::Result;

/// Parse a query string.
pub fn parse(input: &str) -> Result<ast::QueryAst> {
    parser::Parser::new(input).parse()
}
