#![forbid(unsafe_code)]

use strata_ast::{
    BinaryOperator, DataClassification, EffectDecl, Expr, FieldDef, FunctionDecl, Literal,
    MatchCase, Module, ModuleElement, Param, Pattern, PermissionDecl, PolicyDecl, PolicyRule,
    RoleDecl, RuleEffect, RuleVersionConstraint, ScopeEntry, Span, Stability, TypeDefDecl,
    TypeExpr, UnaryOperator, VersionInfo,
};
use strata_lex::{Token, TokenKind};

use crate::error::ParseError;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, idx: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.idx)
            .unwrap_or_else(|| self.tokens.last().expect("token stream has eof"))
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.idx < self.tokens.len() {
            self.idx += 1;
        }
        tok
    }

    fn err_expected(&self, expected: &str) -> ParseError {
        let tok = self.peek();
        ParseError::new(
            format!("expected {expected}, got {}", tok.kind.display()),
            tok.span,
        )
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if *self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.err_expected(what))
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// An identifier, possibly dot-joined (`a.b.c`), possibly a keyword used
    /// in name position.
    fn parse_name(&mut self) -> Result<(String, Span), ParseError> {
        let first = self.parse_name_segment()?;
        let mut name = first.0;
        let mut span = first.1;
        while self.at(&TokenKind::Dot) {
            self.advance();
            let (seg, seg_span) = self.parse_name_segment()?;
            name.push('.');
            name.push_str(&seg);
            span = span.merge(seg_span);
        }
        Ok((name, span))
    }

    fn parse_name_segment(&mut self) -> Result<(String, Span), ParseError> {
        let tok = self.peek().clone();
        let text = match &tok.kind {
            TokenKind::Ident(s) => s.clone(),
            // Keywords double as ordinary names outside head position.
            TokenKind::KwMod
            | TokenKind::KwFn
            | TokenKind::KwType
            | TokenKind::KwRole
            | TokenKind::KwPermission
            | TokenKind::KwPolicy
            | TokenKind::KwBody
            | TokenKind::KwLet
            | TokenKind::KwIf
            | TokenKind::KwCond
            | TokenKind::KwMatch
            | TokenKind::KwDo
            | TokenKind::KwLambda => tok.kind.display(),
            _ => return Err(self.err_expected("identifier")),
        };
        self.advance();
        Ok((text, tok.span))
    }

    // ------------------------------------------------------------------
    // Modules and declarations
    // ------------------------------------------------------------------

    pub fn parse_module(&mut self) -> Result<Module, ParseError> {
        let open = self.expect(TokenKind::LParen, "(")?;
        self.expect(TokenKind::KwMod, "mod")?;
        let (name, _) = self.parse_name()?;

        let mut elements = Vec::new();
        while !self.at(&TokenKind::RParen) {
            if self.at(&TokenKind::Eof) {
                return Err(self.err_expected(")"));
            }
            elements.push(self.parse_element()?);
        }
        let close = self.advance();

        Ok(Module {
            name,
            elements,
            span: open.span.merge(close.span),
        })
    }

    fn parse_element(&mut self) -> Result<ModuleElement, ParseError> {
        let open = self.expect(TokenKind::LParen, "(")?;
        match self.peek_kind().clone() {
            TokenKind::KwFn => {
                self.advance();
                Ok(ModuleElement::Function(self.parse_function(open.span)?))
            }
            TokenKind::KwType => {
                self.advance();
                Ok(ModuleElement::TypeDef(self.parse_type_def(open.span)?))
            }
            TokenKind::KwRole => {
                self.advance();
                Ok(ModuleElement::Role(self.parse_role(open.span)?))
            }
            TokenKind::KwPermission => {
                self.advance();
                Ok(ModuleElement::Permission(self.parse_permission(open.span)?))
            }
            TokenKind::KwPolicy => {
                self.advance();
                Ok(ModuleElement::Policy(self.parse_policy(open.span)?))
            }
            _ => Err(self.err_expected("fn, type, role, permission or policy")),
        }
    }

    fn parse_function(&mut self, open: Span) -> Result<FunctionDecl, ParseError> {
        let (name, name_span) = self.parse_name()?;
        let mut decl = FunctionDecl {
            name,
            version: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            pure: false,
            idempotent: false,
            required_roles: Vec::new(),
            required_permissions: Vec::new(),
            required_capabilities: Vec::new(),
            audit_required: false,
            handles_secrets: false,
            effects: Vec::new(),
            body: Vec::new(),
            span: open,
        };
        let mut version = VersionInfo::default();
        let mut has_version = false;
        let mut has_body = false;

        // Attribute order is free; duplicates are last-wins. The body form
        // terminates the loop.
        while !self.at(&TokenKind::RParen) {
            match self.peek_kind().clone() {
                TokenKind::VersionMarker(v) => {
                    self.advance();
                    version.version = v;
                    has_version = true;
                }
                TokenKind::KeywordMarker(key) => {
                    self.advance();
                    self.parse_function_attr(&key, &mut decl, &mut version, &mut has_version)?;
                }
                TokenKind::LParen => {
                    self.advance();
                    self.expect(TokenKind::KwBody, "body")?;
                    let mut body = Vec::new();
                    while !self.at(&TokenKind::RParen) {
                        body.push(self.parse_expr()?);
                    }
                    self.advance();
                    decl.body = body;
                    has_body = true;
                    // body must be the last attribute of the form
                    if !self.at(&TokenKind::RParen) {
                        return Err(ParseError::new(
                            "expected ) after body, got further attributes",
                            self.peek().span,
                        ));
                    }
                }
                _ => return Err(self.err_expected("attribute marker or body")),
            }
        }
        let close = self.advance();
        decl.span = open.merge(close.span);

        if !has_body {
            return Err(ParseError::new(
                format!("function '{}' has no body", decl.name),
                name_span,
            ));
        }
        if has_version {
            decl.version = Some(version);
        }
        Ok(decl)
    }

    fn parse_function_attr(
        &mut self,
        key: &str,
        decl: &mut FunctionDecl,
        version: &mut VersionInfo,
        has_version: &mut bool,
    ) -> Result<(), ParseError> {
        match key {
            "pure" => decl.pure = self.parse_bool_value()?,
            "idempotent" => decl.idempotent = self.parse_bool_value()?,
            "audit" => decl.audit_required = self.parse_bool_value()?,
            "handles-secrets" => decl.handles_secrets = self.parse_bool_value()?,
            "inputs" => decl.inputs = self.parse_param_list()?,
            "outputs" => decl.outputs = self.parse_param_list()?,
            "requires" => decl.required_roles = self.parse_name_list()?,
            "permissions" => decl.required_permissions = self.parse_name_list()?,
            "capabilities" => decl.required_capabilities = self.parse_name_list()?,
            "effects" => decl.effects = self.parse_effect_list()?,
            "replaces" => {
                version.replaces = Some(self.parse_version_value()?);
                *has_version = true;
            }
            "stability" => {
                let (word, span) = self.parse_name()?;
                version.stability = Stability::parse(&word).ok_or_else(|| {
                    ParseError::new(format!("unknown stability '{word}'"), span)
                })?;
                *has_version = true;
            }
            "rollback-safe" => {
                version.rollback_safe = Some(self.parse_bool_value()?);
                *has_version = true;
            }
            "deprecated" => {
                version.deprecated = self.parse_bool_value()?;
                *has_version = true;
            }
            other => {
                return Err(ParseError::new(
                    format!("unknown function attribute ':{other}'"),
                    self.peek().span,
                ))
            }
        }
        Ok(())
    }

    fn parse_type_def(&mut self, open: Span) -> Result<TypeDefDecl, ParseError> {
        let (name, _) = self.parse_name()?;
        let mut decl = TypeDefDecl {
            name,
            version: None,
            fields: Vec::new(),
            span: open,
        };
        let mut version = VersionInfo::default();
        let mut has_version = false;

        while !self.at(&TokenKind::RParen) {
            match self.peek_kind().clone() {
                TokenKind::VersionMarker(v) => {
                    self.advance();
                    version.version = v;
                    has_version = true;
                }
                TokenKind::KeywordMarker(key) => {
                    self.advance();
                    match key.as_str() {
                        "fields" => decl.fields = self.parse_field_list()?,
                        "replaces" => {
                            version.replaces = Some(self.parse_version_value()?);
                            has_version = true;
                        }
                        "stability" => {
                            let (word, span) = self.parse_name()?;
                            version.stability = Stability::parse(&word).ok_or_else(|| {
                                ParseError::new(format!("unknown stability '{word}'"), span)
                            })?;
                            has_version = true;
                        }
                        "deprecated" => {
                            version.deprecated = self.parse_bool_value()?;
                            has_version = true;
                        }
                        other => {
                            return Err(ParseError::new(
                                format!("unknown type attribute ':{other}'"),
                                self.peek().span,
                            ))
                        }
                    }
                }
                _ => return Err(self.err_expected("attribute marker")),
            }
        }
        let close = self.advance();
        decl.span = open.merge(close.span);
        if has_version {
            decl.version = Some(version);
        }
        Ok(decl)
    }

    fn parse_role(&mut self, open: Span) -> Result<RoleDecl, ParseError> {
        let (name, _) = self.parse_name()?;
        let mut decl = RoleDecl {
            name,
            permissions: Vec::new(),
            inherits: Vec::new(),
            span: open,
        };
        while !self.at(&TokenKind::RParen) {
            let key = self.parse_keyword_marker()?;
            match key.as_str() {
                "permissions" => decl.permissions = self.parse_name_list()?,
                "inherits" => decl.inherits = self.parse_name_list()?,
                other => {
                    return Err(ParseError::new(
                        format!("unknown role attribute ':{other}'"),
                        self.peek().span,
                    ))
                }
            }
        }
        let close = self.advance();
        decl.span = open.merge(close.span);
        Ok(decl)
    }

    fn parse_permission(&mut self, open: Span) -> Result<PermissionDecl, ParseError> {
        let (name, _) = self.parse_name()?;
        let mut decl = PermissionDecl {
            name,
            doc: None,
            scope: Vec::new(),
            classification: None,
            audit_required: false,
            span: open,
        };
        while !self.at(&TokenKind::RParen) {
            let key = self.parse_keyword_marker()?;
            match key.as_str() {
                "doc" => decl.doc = Some(self.parse_string_value()?),
                "scope" => decl.scope = self.parse_scope_list()?,
                "classification" => {
                    let (word, span) = self.parse_name()?;
                    decl.classification =
                        Some(DataClassification::parse(&word).ok_or_else(|| {
                            ParseError::new(format!("unknown classification '{word}'"), span)
                        })?);
                }
                "audit" => decl.audit_required = self.parse_bool_value()?,
                other => {
                    return Err(ParseError::new(
                        format!("unknown permission attribute ':{other}'"),
                        self.peek().span,
                    ))
                }
            }
        }
        let close = self.advance();
        decl.span = open.merge(close.span);
        Ok(decl)
    }

    fn parse_policy(&mut self, open: Span) -> Result<PolicyDecl, ParseError> {
        let (name, _) = self.parse_name()?;
        let mut decl = PolicyDecl {
            name,
            rules: Vec::new(),
            span: open,
        };
        while !self.at(&TokenKind::RParen) {
            let key = self.parse_keyword_marker()?;
            match key.as_str() {
                "rules" => {
                    self.expect(TokenKind::LBracket, "[")?;
                    while !self.at(&TokenKind::RBracket) {
                        decl.rules.push(self.parse_policy_rule()?);
                    }
                    self.advance();
                }
                other => {
                    return Err(ParseError::new(
                        format!("unknown policy attribute ':{other}'"),
                        self.peek().span,
                    ))
                }
            }
        }
        let close = self.advance();
        decl.span = open.merge(close.span);
        Ok(decl)
    }

    fn parse_policy_rule(&mut self) -> Result<PolicyRule, ParseError> {
        let open = self.expect(TokenKind::LParen, "(")?;
        let (head, head_span) = self.parse_name()?;
        let effect = match head.as_str() {
            "allow" => RuleEffect::Allow,
            "deny" => RuleEffect::Deny,
            other => {
                return Err(ParseError::new(
                    format!("expected allow or deny, got {other}"),
                    head_span,
                ))
            }
        };
        let mut rule = PolicyRule {
            effect,
            roles: Vec::new(),
            permissions: Vec::new(),
            version_constraint: RuleVersionConstraint::AllVersions,
            reason: None,
            span: open.span,
        };
        while !self.at(&TokenKind::RParen) {
            let key = self.parse_keyword_marker()?;
            match key.as_str() {
                "roles" => rule.roles = self.parse_name_list()?,
                "permissions" => rule.permissions = self.parse_name_list()?,
                "versions" => rule.version_constraint = self.parse_rule_versions()?,
                "reason" => rule.reason = Some(self.parse_string_value()?),
                other => {
                    return Err(ParseError::new(
                        format!("unknown rule attribute ':{other}'"),
                        self.peek().span,
                    ))
                }
            }
        }
        let close = self.advance();
        rule.span = open.span.merge(close.span);
        Ok(rule)
    }

    fn parse_rule_versions(&mut self) -> Result<RuleVersionConstraint, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(word) => {
                let span = self.peek().span;
                self.advance();
                match word.as_str() {
                    "all-versions" | "all" => Ok(RuleVersionConstraint::AllVersions),
                    "stable-only" | "stable" => Ok(RuleVersionConstraint::StableOnly),
                    other => Err(ParseError::new(
                        format!("unknown version scope '{other}'"),
                        span,
                    )),
                }
            }
            TokenKind::LBracket => {
                self.advance();
                let mut versions = Vec::new();
                while !self.at(&TokenKind::RBracket) {
                    versions.push(self.parse_version_value()?);
                }
                self.advance();
                Ok(RuleVersionConstraint::Specific(versions))
            }
            TokenKind::Str(_) => Ok(RuleVersionConstraint::Range(self.parse_string_value()?)),
            _ => Err(self.err_expected("version scope")),
        }
    }

    // ------------------------------------------------------------------
    // Attribute payloads
    // ------------------------------------------------------------------

    fn parse_keyword_marker(&mut self) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::KeywordMarker(key) => {
                self.advance();
                Ok(key)
            }
            _ => Err(self.err_expected("attribute marker")),
        }
    }

    fn parse_bool_value(&mut self) -> Result<bool, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Bool(b) => {
                self.advance();
                Ok(b)
            }
            _ => Err(self.err_expected("true or false")),
        }
    }

    fn parse_string_value(&mut self) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Str(raw) => {
                self.advance();
                Ok(unquote(&raw))
            }
            _ => Err(self.err_expected("string")),
        }
    }

    /// A version given as either `:v1.2.3` or `"1.2.3"`.
    fn parse_version_value(&mut self) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::VersionMarker(v) => {
                self.advance();
                Ok(v)
            }
            TokenKind::Str(_) => self.parse_string_value(),
            _ => Err(self.err_expected("version")),
        }
    }

    fn parse_name_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(TokenKind::LBracket, "[")?;
        let mut names = Vec::new();
        while !self.at(&TokenKind::RBracket) {
            names.push(self.parse_name()?.0);
        }
        self.advance();
        Ok(names)
    }

    fn parse_param_list(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(TokenKind::LBracket, "[")?;
        let mut params = Vec::new();
        while !self.at(&TokenKind::RBracket) {
            params.push(self.parse_param()?);
        }
        self.advance();
        Ok(params)
    }

    fn parse_param(&mut self) -> Result<Param, ParseError> {
        let open = self.expect(TokenKind::LParen, "(")?;
        let (name, _) = self.parse_name()?;
        let ty = self.parse_type_expr()?;
        let mut param = Param {
            name,
            ty,
            optional: false,
            classification: None,
            span: open.span,
        };
        while !self.at(&TokenKind::RParen) {
            match self.peek_kind().clone() {
                TokenKind::Question => {
                    self.advance();
                    param.optional = true;
                }
                TokenKind::KeywordMarker(key) => {
                    let span = self.peek().span;
                    self.advance();
                    match key.as_str() {
                        "optional" => param.optional = self.parse_bool_value()?,
                        other => {
                            if let Some(c) = DataClassification::parse(other) {
                                param.classification = Some(c);
                            } else {
                                return Err(ParseError::new(
                                    format!("unknown parameter attribute ':{other}'"),
                                    span,
                                ));
                            }
                        }
                    }
                }
                _ => return Err(self.err_expected(")")),
            }
        }
        let close = self.advance();
        param.span = open.span.merge(close.span);
        Ok(param)
    }

    fn parse_field_list(&mut self) -> Result<Vec<FieldDef>, ParseError> {
        self.expect(TokenKind::LBracket, "[")?;
        let mut fields = Vec::new();
        while !self.at(&TokenKind::RBracket) {
            let open = self.expect(TokenKind::LParen, "(")?;
            let (name, _) = self.parse_name()?;
            let ty = self.parse_type_expr()?;
            let mut field = FieldDef {
                name,
                ty,
                classification: None,
                span: open.span,
            };
            while !self.at(&TokenKind::RParen) {
                match self.peek_kind().clone() {
                    TokenKind::KeywordMarker(key) => {
                        let span = self.peek().span;
                        self.advance();
                        if let Some(c) = DataClassification::parse(&key) {
                            field.classification = Some(c);
                        } else {
                            return Err(ParseError::new(
                                format!("unknown field attribute ':{key}'"),
                                span,
                            ));
                        }
                    }
                    _ => return Err(self.err_expected(")")),
                }
            }
            let close = self.advance();
            field.span = open.span.merge(close.span);
            fields.push(field);
        }
        self.advance();
        Ok(fields)
    }

    fn parse_scope_list(&mut self) -> Result<Vec<ScopeEntry>, ParseError> {
        self.expect(TokenKind::LBracket, "[")?;
        let mut entries = Vec::new();
        while !self.at(&TokenKind::RBracket) {
            self.expect(TokenKind::LParen, "(")?;
            let (key, key_span) = self.parse_name()?;
            if key != "resource" && key != "action" {
                return Err(ParseError::new(
                    format!("expected resource or action, got {key}"),
                    key_span,
                ));
            }
            let (value, _) = self.parse_name()?;
            self.expect(TokenKind::RParen, ")")?;
            entries.push(ScopeEntry { key, value });
        }
        self.advance();
        Ok(entries)
    }

    fn parse_effect_list(&mut self) -> Result<Vec<EffectDecl>, ParseError> {
        self.expect(TokenKind::LBracket, "[")?;
        let mut effects = Vec::new();
        while !self.at(&TokenKind::RBracket) {
            let open = self.expect(TokenKind::LParen, "(")?;
            let (effect_type, _) = self.parse_name()?;
            let (target, _) = self.parse_name()?;
            let close = self.expect(TokenKind::RParen, ")")?;
            effects.push(EffectDecl {
                effect_type,
                target,
                span: open.span.merge(close.span),
            });
        }
        self.advance();
        Ok(effects)
    }

    /// `:string`, `string`, or `(List :int)`.
    pub fn parse_type_expr(&mut self) -> Result<TypeExpr, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::KeywordMarker(name) => {
                self.advance();
                Ok(TypeExpr::from_name(&name))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(TypeExpr::from_name(&name))
            }
            TokenKind::LParen => {
                self.advance();
                let (head, head_span) = self.parse_name()?;
                let base = TypeExpr::from_name(&head);
                let head = match base {
                    TypeExpr::Generic { head, .. } => head,
                    _ => {
                        return Err(ParseError::new(
                            format!("'{head}' is not a generic type"),
                            head_span,
                        ))
                    }
                };
                let mut args = Vec::new();
                while !self.at(&TokenKind::RParen) {
                    args.push(self.parse_type_expr()?);
                }
                self.advance();
                Ok(TypeExpr::Generic { head, args })
            }
            _ => Err(self.err_expected("type")),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Number(text) => {
                self.advance();
                let lit = parse_number(&text, tok.span)?;
                Ok(Expr::Literal(lit, tok.span))
            }
            TokenKind::Str(raw) => {
                self.advance();
                Ok(Expr::Literal(Literal::Str(unquote(&raw)), tok.span))
            }
            TokenKind::Bool(b) => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(b), tok.span))
            }
            TokenKind::Ident(_) => {
                let (name, span) = self.parse_name()?;
                if name.contains('.') {
                    let version = self.try_version_marker();
                    Ok(Expr::QualifiedName {
                        parts: name.split('.').map(str::to_string).collect(),
                        version,
                        span,
                    })
                } else {
                    Ok(Expr::Identifier(name, span))
                }
            }
            TokenKind::LParen => self.parse_form(),
            _ => Err(self.err_expected("expression")),
        }
    }

    fn try_version_marker(&mut self) -> Option<String> {
        if let TokenKind::VersionMarker(v) = self.peek_kind().clone() {
            self.advance();
            Some(v)
        } else {
            None
        }
    }

    fn parse_form(&mut self) -> Result<Expr, ParseError> {
        let open = self.expect(TokenKind::LParen, "(")?;
        match self.peek_kind().clone() {
            TokenKind::KwLet => {
                self.advance();
                self.parse_let(open.span)
            }
            TokenKind::KwIf => {
                self.advance();
                self.parse_if(open.span)
            }
            TokenKind::KwCond => {
                self.advance();
                self.parse_cond(open.span)
            }
            TokenKind::KwMatch => {
                self.advance();
                self.parse_match(open.span)
            }
            TokenKind::KwDo => {
                self.advance();
                let mut exprs = Vec::new();
                while !self.at(&TokenKind::RParen) {
                    exprs.push(self.parse_expr()?);
                }
                let close = self.advance();
                Ok(Expr::Do {
                    exprs,
                    span: open.span.merge(close.span),
                })
            }
            TokenKind::KwLambda => {
                self.advance();
                self.parse_lambda(open.span)
            }
            TokenKind::Plus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent
            | TokenKind::Eq
            | TokenKind::EqEq
            | TokenKind::Neq
            | TokenKind::Lt
            | TokenKind::Le
            | TokenKind::Gt
            | TokenKind::Ge => {
                let op_tok = self.advance();
                let op = BinaryOperator::parse(&op_tok.kind.display())
                    .expect("operator token maps to operator");
                self.parse_operator_call(open.span, op)
            }
            TokenKind::KwMod => {
                // `mod` in head position is the modulo operator.
                self.advance();
                self.parse_operator_call(open.span, BinaryOperator::Mod)
            }
            TokenKind::Ident(head) => match head.as_str() {
                "and" => {
                    self.advance();
                    self.parse_operator_call(open.span, BinaryOperator::And)
                }
                "or" => {
                    self.advance();
                    self.parse_operator_call(open.span, BinaryOperator::Or)
                }
                "not" => {
                    self.advance();
                    let operand = self.parse_expr()?;
                    let close = self.expect(TokenKind::RParen, ")")?;
                    Ok(Expr::UnaryOp {
                        op: UnaryOperator::Not,
                        operand: Box::new(operand),
                        span: open.span.merge(close.span),
                    })
                }
                "-" => {
                    self.advance();
                    self.parse_minus_call(open.span)
                }
                _ => self.parse_call(open.span),
            },
            _ => Err(self.err_expected("expression form")),
        }
    }

    fn parse_let(&mut self, open: Span) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LBracket, "[")?;
        let mut bindings = Vec::new();
        while !self.at(&TokenKind::RBracket) {
            self.expect(TokenKind::LParen, "(")?;
            let (name, _) = self.parse_name()?;
            let value = self.parse_expr()?;
            self.expect(TokenKind::RParen, ")")?;
            bindings.push((name, value));
        }
        self.advance();

        let mut body = Vec::new();
        while !self.at(&TokenKind::RParen) {
            body.push(self.parse_expr()?);
        }
        if body.is_empty() {
            return Err(ParseError::new("let has an empty body", open));
        }
        let close = self.advance();
        Ok(Expr::Let {
            bindings,
            body,
            span: open.merge(close.span),
        })
    }

    fn parse_if(&mut self, open: Span) -> Result<Expr, ParseError> {
        let condition = self.parse_expr()?;
        let then_branch = self.parse_expr()?;
        let else_branch = if !self.at(&TokenKind::RParen) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        let close = self.expect(TokenKind::RParen, ")")?;
        Ok(Expr::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch,
            span: open.merge(close.span),
        })
    }

    fn parse_cond(&mut self, open: Span) -> Result<Expr, ParseError> {
        let mut clauses = Vec::new();
        let mut else_clause = None;
        while !self.at(&TokenKind::RParen) {
            self.expect(TokenKind::LParen, "(")?;
            if matches!(self.peek_kind(), TokenKind::Ident(s) if s == "else") {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, ")")?;
                else_clause = Some(Box::new(expr));
                break;
            }
            let test = self.parse_expr()?;
            let result = self.parse_expr()?;
            self.expect(TokenKind::RParen, ")")?;
            clauses.push((test, result));
        }
        let close = self.expect(TokenKind::RParen, ")")?;
        Ok(Expr::Cond {
            clauses,
            else_clause,
            span: open.merge(close.span),
        })
    }

    fn parse_match(&mut self, open: Span) -> Result<Expr, ParseError> {
        let scrutinee = self.parse_expr()?;
        let mut cases = Vec::new();
        while !self.at(&TokenKind::RParen) {
            let case_open = self.expect(TokenKind::LParen, "(")?;
            let pattern = self.parse_pattern()?;
            let body = self.parse_expr()?;
            let case_close = self.expect(TokenKind::RParen, ")")?;
            cases.push(MatchCase {
                pattern,
                body,
                span: case_open.span.merge(case_close.span),
            });
        }
        let close = self.advance();
        Ok(Expr::Match {
            scrutinee: Box::new(scrutinee),
            cases,
            span: open.merge(close.span),
        })
    }

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Number(text) => {
                self.advance();
                Ok(Pattern::Literal(parse_number(&text, tok.span)?, tok.span))
            }
            TokenKind::Str(raw) => {
                self.advance();
                Ok(Pattern::Literal(Literal::Str(unquote(&raw)), tok.span))
            }
            TokenKind::Bool(b) => {
                self.advance();
                Ok(Pattern::Literal(Literal::Bool(b), tok.span))
            }
            TokenKind::Ident(name) if name == "_" => {
                self.advance();
                Ok(Pattern::Wildcard(tok.span))
            }
            TokenKind::Ident(_) => {
                let (name, span) = self.parse_name()?;
                if let Some((ty, case)) = name.rsplit_once('.') {
                    Ok(Pattern::Constructor {
                        type_name: ty.to_string(),
                        case: case.to_string(),
                        binding: None,
                        span,
                    })
                } else {
                    Ok(Pattern::Binding(name, span))
                }
            }
            TokenKind::LParen => {
                let open = self.advance();
                let (name, name_span) = self.parse_name()?;
                let Some((ty, case)) = name.rsplit_once('.') else {
                    return Err(ParseError::new(
                        format!("expected Type.Case constructor, got {name}"),
                        name_span,
                    ));
                };
                let binding = if !self.at(&TokenKind::RParen) {
                    Some(self.parse_name()?.0)
                } else {
                    None
                };
                let close = self.expect(TokenKind::RParen, ")")?;
                Ok(Pattern::Constructor {
                    type_name: ty.to_string(),
                    case: case.to_string(),
                    binding,
                    span: open.span.merge(close.span),
                })
            }
            _ => Err(self.err_expected("pattern")),
        }
    }

    fn parse_lambda(&mut self, open: Span) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LBracket, "[")?;
        let mut params = Vec::new();
        while !self.at(&TokenKind::RBracket) {
            params.push(self.parse_name()?.0);
        }
        self.advance();
        let mut body = Vec::new();
        while !self.at(&TokenKind::RParen) {
            body.push(self.parse_expr()?);
        }
        let close = self.advance();
        Ok(Expr::Lambda {
            params,
            body,
            span: open.merge(close.span),
        })
    }

    fn parse_operator_call(&mut self, open: Span, op: BinaryOperator) -> Result<Expr, ParseError> {
        let lhs = self.parse_expr()?;
        let rhs = self.parse_expr()?;
        let close = self.expect(TokenKind::RParen, ")")?;
        Ok(Expr::BinaryOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span: open.merge(close.span),
        })
    }

    /// `(- x)` negates; `(- a b)` subtracts.
    fn parse_minus_call(&mut self, open: Span) -> Result<Expr, ParseError> {
        let first = self.parse_expr()?;
        if self.at(&TokenKind::RParen) {
            let close = self.advance();
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Neg,
                operand: Box::new(first),
                span: open.merge(close.span),
            });
        }
        let rhs = self.parse_expr()?;
        let close = self.expect(TokenKind::RParen, ")")?;
        Ok(Expr::BinaryOp {
            op: BinaryOperator::Sub,
            lhs: Box::new(first),
            rhs: Box::new(rhs),
            span: open.merge(close.span),
        })
    }

    fn parse_call(&mut self, open: Span) -> Result<Expr, ParseError> {
        let (target, _) = self.parse_name()?;
        let version = self.try_version_marker();
        let mut args = Vec::new();
        while !self.at(&TokenKind::RParen) {
            args.push(self.parse_expr()?);
        }
        let close = self.advance();
        Ok(Expr::Call {
            target,
            version,
            args,
            span: open.merge(close.span),
        })
    }
}

/// Strip the surrounding quotes and decode the common escapes. Unrecognized
/// escapes keep both characters.
fn unquote(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_number(text: &str, span: Span) -> Result<Literal, ParseError> {
    if text.contains('.') {
        text.parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| ParseError::new(format!("invalid number '{text}'"), span))
    } else {
        text.parse::<i64>()
            .map(Literal::Int)
            .map_err(|_| ParseError::new(format!("invalid number '{text}'"), span))
    }
}
