//! Source-to-source rewriting of legacy js-test.js assertions.
//!
//! Parses one script with oxc, applies the rewrite rules in a single AST
//! traversal, then prints the result. The legacy convention passes code as
//! quoted strings (`shouldBeTrue("foo()")`); the target convention takes
//! live expressions (`assert_true(foo())`), so string arguments are
//! re-parsed as expressions — a real parse, never textual substitution.
//!
//! Rule order (name sets are disjoint, so one call matches one rule):
//! setup injection, boolean assertions, fixed-value assertions, comparator
//! assertions, typed equality, description harvesting, debug → console.log,
//! testRunner.dumpAsText() removal, then the unsupported-call check, which
//! must come after the tables so it only trips on genuinely unhandled
//! legacy calls. `done()` is appended textually after printing.

use oxc::allocator::Allocator;
use oxc::ast::AstBuilder;
use oxc::ast::ast::{Argument, CallExpression, Expression, Statement};
use oxc::ast_visit::{VisitMut, walk_mut};
use oxc::codegen::Codegen;
use oxc::parser::Parser;
use oxc::span::{Atom, SPAN, SourceType};
use oxc::syntax::number::NumberBase;
use thiserror::Error;

/// Rewriting errors, fatal for the containing file.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("script failed to parse: {0}")]
    Parse(String),

    #[error("`{function}` expects a string literal argument at position {index}")]
    ExpectedStringArgument { function: String, index: usize },

    #[error("argument `{0}` does not re-parse as an expression")]
    BadExpressionArgument(String),

    #[error("untransformable function from js-test.js: {0}")]
    UnsupportedCall(String),
}

/// Result of rewriting a single script.
#[derive(Debug)]
pub struct Rewritten {
    /// The rewritten source code.
    pub code: String,
    /// Title harvested from the first `description()` call, if any.
    pub title: Option<String>,
}

/// Metadata accumulated during traversal, passed explicitly instead of
/// being captured in closure state.
#[derive(Debug, Default)]
pub struct TransformInfo {
    title: Option<String>,
}

// ============================================================================
// Rewrite Tables
// ============================================================================

/// Boolean assertions: sole string argument becomes a live expression.
const BOOL_TABLE: &[(&str, &str)] = &[
    ("shouldBeTrue", "assert_true"),
    ("shouldBeFalse", "assert_false"),
];

/// Fixed second argument of a value assertion.
#[derive(Debug, Clone, Copy)]
enum FixedValue {
    NaN,
    Null,
    Undefined,
    Zero,
    EmptyString,
}

/// Value assertions: `f("expr")` → `assert(expr, <fixed>)`.
const VALUE_TABLE: &[(&str, &str, FixedValue)] = &[
    ("shouldBeNaN", "assert_equals", FixedValue::NaN),
    ("shouldBeNull", "assert_equals", FixedValue::Null),
    ("shouldBeNonNull", "assert_not_equals", FixedValue::Null),
    ("shouldBeUndefined", "assert_equals", FixedValue::Undefined),
    ("shouldBeDefined", "assert_not_equals", FixedValue::Undefined),
    ("shouldBeZero", "assert_equals", FixedValue::Zero),
    ("shouldBeNonZero", "assert_not_equals", FixedValue::Zero),
    ("shouldBeEmptyString", "assert_equals", FixedValue::EmptyString),
];

/// Comparator assertions: both string arguments become live expressions.
const COMPARATOR_TABLE: &[(&str, &str)] = &[
    ("shouldBe", "assert_equals"),
    ("shouldNotBe", "assert_not_equals"),
    ("shouldBeGreaterThan", "assert_greater_than"),
    ("shouldBeGreaterThanOrEqualTo", "assert_greater_than_equal"),
];

/// Typed equality: first argument re-parsed, second already a literal.
const EQUAL_TO_TABLE: &[(&str, &str)] = &[
    ("shouldBeEqualToString", "assert_equals"),
    ("shouldBeEqualToNumber", "assert_equals"),
];

/// Legacy js-test.js calls with no testharness.js equivalent. Hitting one
/// of these fails the whole rewrite.
const UNTRANSFORMED: &[&str] = &[
    "evalAndLog",
    "shouldBecomeEqual",
    "shouldBecomeEqualToString",
    "shouldBeType",
    "shouldBeCloseTo",
    "shouldBecomeDifferent",
    "shouldEvaluateTo",
    "shouldEvaluateToSameobject",
    "shouldNotThrow",
    "shouldThrow",
    "shouldBeNow",
    "expectError",
    "shouldHaveHadError",
    "gc",
    "isSuccessfulyParsed",
    "finishJSTest",
    "startWorker",
];

/// Statement prepended to the first non-empty script of a file.
const SETUP_CALL: &str = "setup({ single_test: true });";

// ============================================================================
// Entry Point
// ============================================================================

/// Rewrite one script from the legacy convention to testharness.js calls.
///
/// `add_setup` prepends the harness setup call (first non-empty script of a
/// file only); `add_done` appends the completion signal (last non-empty
/// script only).
pub fn rewrite_script(
    source: &str,
    add_setup: bool,
    add_done: bool,
) -> Result<Rewritten, RewriteError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if !ret.errors.is_empty() {
        let msg = ret
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(RewriteError::Parse(msg));
    }
    let mut program = ret.program;

    let mut info = TransformInfo::default();
    let mut rewriter = Rewriter {
        ast: AstBuilder::new(&allocator),
        allocator: &allocator,
        info: &mut info,
        error: None,
    };
    rewriter.visit_program(&mut program);
    if let Some(err) = rewriter.error {
        return Err(err);
    }

    if add_setup {
        let mut setup = Parser::new(&allocator, SETUP_CALL, SourceType::mjs()).parse();
        if let Some(stmt) = setup.program.body.pop() {
            program.body.insert(0, stmt);
        }
    }

    let mut code = Codegen::new().build(&program).code;
    if add_done {
        while code.ends_with('\n') {
            code.pop();
        }
        // Textual append so the statement never disturbs printed formatting.
        code.push_str("\ndone();");
    }

    Ok(Rewritten {
        code,
        title: info.title,
    })
}

// ============================================================================
// Visitor
// ============================================================================

struct Rewriter<'a, 'i> {
    ast: AstBuilder<'a>,
    allocator: &'a Allocator,
    info: &'i mut TransformInfo,
    error: Option<RewriteError>,
}

impl<'a> VisitMut<'a> for Rewriter<'a, '_> {
    fn visit_statements(&mut self, stmts: &mut oxc::allocator::Vec<'a, Statement<'a>>) {
        // description() and testRunner.dumpAsText() statements are dropped
        // here, before their children would be visited.
        let old = std::mem::replace(stmts, self.ast.vec());
        for stmt in old {
            if !self.should_remove(&stmt) {
                stmts.push(stmt);
            }
        }
        walk_mut::walk_statements(self, stmts);
    }

    fn visit_call_expression(&mut self, call: &mut CallExpression<'a>) {
        self.rewrite_call(call);
        walk_mut::walk_call_expression(self, call);
    }
}

impl<'a> Rewriter<'a, '_> {
    /// Whether a statement is a legacy call to delete, harvesting the title
    /// from `description()` along the way (first occurrence wins).
    fn should_remove(&mut self, stmt: &Statement<'a>) -> bool {
        let Statement::ExpressionStatement(es) = stmt else {
            return false;
        };
        let Expression::CallExpression(call) = &es.expression else {
            return false;
        };
        match &call.callee {
            Expression::Identifier(id) if id.name == "description" => {
                if self.info.title.is_none()
                    && let Some(Argument::StringLiteral(lit)) = call.arguments.first()
                {
                    self.info.title = Some(lit.value.to_string());
                }
                true
            }
            // testharnessreport.js dumps as text automatically.
            Expression::StaticMemberExpression(member) => {
                member.property.name == "dumpAsText"
                    && matches!(&member.object, Expression::Identifier(obj) if obj.name == "testRunner")
            }
            _ => false,
        }
    }

    /// Apply the rewrite tables to one call expression.
    fn rewrite_call(&mut self, call: &mut CallExpression<'a>) {
        if self.error.is_some() {
            return;
        }
        let Expression::Identifier(id) = &call.callee else {
            return;
        };
        let name = id.name.as_str();

        if let Some(&(_, target)) = BOOL_TABLE.iter().find(|(n, _)| *n == name) {
            if let Some(actual) = self.parse_string_arg(call, 0, name) {
                call.arguments[0] = Argument::from(actual);
                rename_callee(call, target);
            }
        } else if let Some(&(_, target, fixed)) =
            VALUE_TABLE.iter().find(|(n, _, _)| *n == name)
        {
            if let Some(actual) = self.parse_string_arg(call, 0, name) {
                let expected = self.fixed_value(fixed);
                let mut args = self.ast.vec_with_capacity(2);
                args.push(Argument::from(actual));
                args.push(Argument::from(expected));
                call.arguments = args;
                rename_callee(call, target);
            }
        } else if let Some(&(_, target)) = COMPARATOR_TABLE.iter().find(|(n, _)| *n == name) {
            if let Some(actual) = self.parse_string_arg(call, 0, name)
                && let Some(expected) = self.parse_string_arg(call, 1, name)
            {
                let mut args = self.ast.vec_with_capacity(2);
                args.push(Argument::from(actual));
                args.push(Argument::from(expected));
                call.arguments = args;
                rename_callee(call, target);
            }
        } else if let Some(&(_, target)) = EQUAL_TO_TABLE.iter().find(|(n, _)| *n == name) {
            if let Some(actual) = self.parse_string_arg(call, 0, name) {
                call.arguments[0] = Argument::from(actual);
                rename_callee(call, target);
            }
        } else if name == "debug" {
            // Keep the arguments, swap the callee for console.log.
            if let Ok(callee) =
                Parser::new(self.allocator, "console.log", SourceType::mjs()).parse_expression()
            {
                call.callee = callee;
            }
        } else if UNTRANSFORMED.contains(&name) {
            self.error
                .get_or_insert(RewriteError::UnsupportedCall(name.to_string()));
        }
    }

    /// Re-parse the string literal at argument `index` as an expression.
    fn parse_string_arg(
        &mut self,
        call: &CallExpression<'a>,
        index: usize,
        function: &str,
    ) -> Option<Expression<'a>> {
        let Some(Argument::StringLiteral(lit)) = call.arguments.get(index) else {
            self.error.get_or_insert(RewriteError::ExpectedStringArgument {
                function: function.to_string(),
                index,
            });
            return None;
        };
        let source: &'a str = lit.value.as_str();
        match Parser::new(self.allocator, source, SourceType::mjs()).parse_expression() {
            Ok(expr) => Some(expr),
            Err(_) => {
                self.error
                    .get_or_insert(RewriteError::BadExpressionArgument(source.to_string()));
                None
            }
        }
    }

    /// Build the canonical literal for a value-assertion second argument.
    fn fixed_value(&self, value: FixedValue) -> Expression<'a> {
        match value {
            FixedValue::NaN => self.ast.expression_identifier(SPAN, "NaN"),
            FixedValue::Null => self.ast.expression_null_literal(SPAN),
            FixedValue::Undefined => self.ast.expression_identifier(SPAN, "undefined"),
            FixedValue::Zero => {
                self.ast
                    .expression_numeric_literal(SPAN, 0.0, None, NumberBase::Decimal)
            }
            FixedValue::EmptyString => self.ast.expression_string_literal(SPAN, "", None),
        }
    }
}

/// Rename an identifier callee in place.
fn rename_callee(call: &mut CallExpression<'_>, target: &'static str) {
    if let Expression::Identifier(id) = &mut call.callee {
        id.name = Atom::from(target).into();
    }
}

// ============================================================================
// Tests
// ============================================================================
