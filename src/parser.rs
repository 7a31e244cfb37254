use crate::config::Options;
use crate::error::{Diagnostic, SyntaxError};
use crate::expression::{ExprArena, ExpressionMap, Fragment};
use crate::lexer::Lexer;
use crate::source::SourceText;
use crate::token::{Kind, Token};
use crate::trigger::{Script, Trigger, TriggerBlock, TriggerCategory};

type TokenVisitor<'a> = Box<dyn FnMut(&mut Token, &SourceText) + 'a>;

/// Folds the token stream into triggers.
///
/// Iterating yields each trigger once its operands are complete, i.e. when
/// the next header or the end of the input is reached. Operand expressions
/// are stored in the parser's arena; [`Parser::parse`] hands the arena over
/// together with the Cause-delimited blocks.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    expressions: ExpressionMap,
    visitor: Option<TokenVisitor<'a>>,
    on_error: Option<Box<dyn FnMut(&SyntaxError) + 'a>>,
    arena: ExprArena,
    pending: Option<Trigger>,
    errors: Vec<SyntaxError>,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            expressions: ExpressionMap::default(),
            visitor: None,
            on_error: None,
            arena: ExprArena::new(),
            pending: None,
            errors: Vec::new(),
        }
    }

    pub fn from_text(input: &str, options: &Options) -> Self {
        Self::new(Lexer::from_text(input, options))
    }

    pub fn with_expressions(mut self, expressions: ExpressionMap) -> Self {
        self.expressions = expressions;
        self
    }

    /// Hook that sees, and may rewrite, every token before it is folded.
    pub fn with_visitor(mut self, visitor: impl FnMut(&mut Token, &SourceText) + 'a) -> Self {
        self.visitor = Some(Box::new(visitor));
        self
    }

    pub fn on_error(mut self, handler: impl FnMut(&SyntaxError) + 'a) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    pub fn into_arena(self) -> ExprArena {
        self.arena
    }

    /// Lexing and syntax problems seen so far, in source order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = self
            .lexer
            .errors()
            .iter()
            .cloned()
            .map(Diagnostic::from)
            .chain(self.errors.iter().cloned().map(Diagnostic::from))
            .collect();
        diagnostics.sort_by_key(|d| d.position().offset);
        diagnostics
    }

    /// Parses the rest of the input into a script.
    pub fn parse(mut self) -> (Script, Vec<Diagnostic>) {
        let triggers: Vec<Trigger> = self.by_ref().collect();
        let diagnostics = self.diagnostics();
        let blocks = group_blocks(triggers);
        (Script::new(self.arena, blocks), diagnostics)
    }

    fn report(&mut self, message: String, token: &Token, text: String) {
        let error = SyntaxError::new(message, token.position(), text);
        tracing::debug!("{}", error);
        if let Some(handler) = self.on_error.as_mut() {
            handler(&error);
        }
        self.errors.push(error);
    }

    fn fold(&mut self, token: Token) -> Option<Trigger> {
        let constructor = self.expressions.get(token.kind())?;
        let text = self.lexer.text(&token);
        match constructor(&text, token.position()) {
            Ok(Fragment::Header(mut trigger)) => {
                *trigger.contents_mut() = self.arena.open_range();
                self.pending.replace(trigger)
            }
            Ok(Fragment::Operand(expr)) => {
                // operands with no open trigger are dropped
                if let Some(trigger) = self.pending.as_mut() {
                    self.arena.push(trigger.contents_mut(), expr);
                }
                None
            }
            Err(message) => {
                self.report(message, &token, text);
                if token.kind() == Kind::Trigger {
                    // drop the bad header's operands too
                    self.pending.take()
                } else {
                    None
                }
            }
        }
    }
}

impl Iterator for Parser<'_> {
    type Item = Trigger;

    fn next(&mut self) -> Option<Trigger> {
        loop {
            let Some(mut token) = self.lexer.next() else {
                return self.pending.take();
            };
            if let Some(visitor) = self.visitor.as_mut() {
                visitor(&mut token, self.lexer.source());
            }
            match token.kind() {
                Kind::EndOfFile => return self.pending.take(),
                Kind::None | Kind::Mod | Kind::Minus | Kind::Comment => continue,
                _ => {
                    if let Some(finished) = self.fold(token) {
                        return Some(finished);
                    }
                }
            }
        }
    }
}

/// Groups triggers into blocks. A block opens at a Cause that does not
/// directly follow another Cause; consecutive Causes are alternative entry
/// points of one block.
pub fn group_blocks(triggers: impl IntoIterator<Item = Trigger>) -> Vec<TriggerBlock> {
    let mut blocks = Vec::new();
    let mut current = TriggerBlock::new();
    let mut previous: Option<TriggerCategory> = None;

    for trigger in triggers {
        let opens_block = trigger.category() == TriggerCategory::Cause
            && previous != Some(TriggerCategory::Cause);
        if opens_block && !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        previous = Some(trigger.category());
        current.push(trigger);
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}
