use strata_ast::{
    BinaryOperator, DataClassification, Expr, Literal, ModuleElement, Pattern, RuleEffect,
    RuleVersionConstraint, Stability, TypeExpr,
};
use strata_parse::{parse_expr, parse_source};

#[test]
fn minimal_module_with_function() {
    let src = r#"
    (mod test
      (fn get_answer :v1 :pure true
        :inputs []
        :outputs [(result :int)]
        (body 42)))
    "#;
    let module = parse_source(src).expect("parse ok");
    assert_eq!(module.name, "test");
    assert_eq!(module.elements.len(), 1);

    let ModuleElement::Function(f) = &module.elements[0] else {
        panic!("expected function");
    };
    assert_eq!(f.name, "get_answer");
    assert!(f.pure);
    assert_eq!(f.version.as_ref().unwrap().version, "v1");
    assert!(f.inputs.is_empty());
    assert_eq!(f.outputs.len(), 1);
    assert_eq!(f.outputs[0].name, "result");
    assert_eq!(f.body.len(), 1);
    assert!(matches!(f.body[0], Expr::Literal(Literal::Int(42), _)));
}

#[test]
fn function_without_body_is_rejected() {
    let src = "(mod m (fn broken :v1 :inputs []))";
    let err = parse_source(src).expect_err("expected error");
    assert!(err.message.contains("no body"), "got: {}", err.message);
}

#[test]
fn attribute_order_is_free_and_body_must_be_last() {
    let ok = r#"
    (mod m
      (fn f :outputs [(r :int)] :v2.1.0 :inputs [(x :int)] :pure true
        (body x)))
    "#;
    let module = parse_source(ok).expect("parse ok");
    let ModuleElement::Function(f) = &module.elements[0] else {
        panic!("expected function");
    };
    assert_eq!(f.version.as_ref().unwrap().version, "v2.1.0");

    let bad = "(mod m (fn f (body 1) :pure true))";
    let err = parse_source(bad).expect_err("body must terminate the form");
    assert!(err.message.contains("after body"), "got: {}", err.message);
}

#[test]
fn duplicate_attributes_last_wins() {
    let src = r#"
    (mod m
      (fn f :pure false :pure true :inputs [] :outputs [(r :int)]
        (body 1)))
    "#;
    let module = parse_source(src).expect("parse ok");
    let ModuleElement::Function(f) = &module.elements[0] else {
        panic!("expected function");
    };
    assert!(f.pure);
}

#[test]
fn version_metadata_attributes() {
    let src = r#"
    (mod m
      (fn f :v2.0.0 :replaces "1.0.0" :stability beta :rollback-safe true
        :inputs [] :outputs [(r :int)]
        (body 1)))
    "#;
    let module = parse_source(src).expect("parse ok");
    let ModuleElement::Function(f) = &module.elements[0] else {
        panic!("expected function");
    };
    let v = f.version.as_ref().unwrap();
    assert_eq!(v.version, "v2.0.0");
    assert_eq!(v.replaces.as_deref(), Some("1.0.0"));
    assert_eq!(v.stability, Stability::Beta);
    assert_eq!(v.rollback_safe, Some(true));
}

#[test]
fn security_attributes_and_effects() {
    let src = r#"
    (mod m
      (fn save_user :v1
        :requires [admin operator]
        :permissions [user.write]
        :effects [(db.write users) (log.info audit)]
        :audit true
        :inputs [(u User)]
        :outputs [(r :bool)]
        (body true)))
    "#;
    let module = parse_source(src).expect("parse ok");
    let ModuleElement::Function(f) = &module.elements[0] else {
        panic!("expected function");
    };
    assert_eq!(f.required_roles, vec!["admin", "operator"]);
    assert_eq!(f.required_permissions, vec!["user.write"]);
    assert!(f.audit_required);
    assert_eq!(f.effects.len(), 2);
    assert_eq!(f.effects[0].effect_type, "db.write");
    assert_eq!(f.effects[0].target, "users");
}

#[test]
fn type_def_with_classified_fields() {
    let src = r#"
    (mod m
      (type User :v1
        :fields [(name :string :public)
                 (email :string :internal)
                 (ssn :string :restricted)]))
    "#;
    let module = parse_source(src).expect("parse ok");
    let ModuleElement::TypeDef(t) = &module.elements[0] else {
        panic!("expected type def");
    };
    assert_eq!(t.name, "User");
    assert_eq!(t.fields.len(), 3);
    assert_eq!(
        t.fields[2].classification,
        Some(DataClassification::Restricted)
    );
    assert_eq!(t.max_classification(), DataClassification::Restricted);
}

#[test]
fn role_permission_policy_declarations() {
    let src = r#"
    (mod m
      (role viewer :permissions [data.read])
      (role admin :permissions [data.write] :inherits [viewer])
      (permission data.read :doc "read access" :scope [(resource data)] :classification internal :audit true)
      (policy main :rules [
        (allow :roles [viewer] :permissions [data.read] :versions all-versions)
        (deny :roles [viewer] :permissions [data.write] :versions stable-only :reason "viewers are read-only")]))
    "#;
    let module = parse_source(src).expect("parse ok");

    let ModuleElement::Role(admin) = &module.elements[1] else {
        panic!("expected role");
    };
    assert_eq!(admin.inherits, vec!["viewer"]);

    let ModuleElement::Permission(p) = &module.elements[2] else {
        panic!("expected permission");
    };
    assert_eq!(p.name, "data.read");
    assert_eq!(p.scope[0].key, "resource");
    assert!(p.audit_required);

    let ModuleElement::Policy(pol) = &module.elements[3] else {
        panic!("expected policy");
    };
    assert_eq!(pol.rules.len(), 2);
    assert_eq!(pol.rules[0].effect, RuleEffect::Allow);
    assert_eq!(pol.rules[1].effect, RuleEffect::Deny);
    assert_eq!(
        pol.rules[1].version_constraint,
        RuleVersionConstraint::StableOnly
    );
    assert_eq!(pol.rules[1].reason.as_deref(), Some("viewers are read-only"));
}

#[test]
fn specific_version_rule_constraint() {
    let src = r#"
    (mod m
      (policy pinned :rules [
        (allow :roles [ops] :permissions [deploy.run] :versions [:v1.0.0 "2.0.0"])]))
    "#;
    let module = parse_source(src).expect("parse ok");
    let ModuleElement::Policy(pol) = &module.elements[0] else {
        panic!("expected policy");
    };
    assert_eq!(
        pol.rules[0].version_constraint,
        RuleVersionConstraint::Specific(vec!["v1.0.0".to_string(), "2.0.0".to_string()])
    );
}

#[test]
fn expressions_if_let_match() {
    let e = parse_expr("(if (> x 10) \"big\" \"small\")").expect("parse ok");
    let Expr::If { condition, .. } = e else {
        panic!("expected if");
    };
    assert!(matches!(
        *condition,
        Expr::BinaryOp {
            op: BinaryOperator::Gt,
            ..
        }
    ));

    let e = parse_expr("(let [(x 1) (y 2)] (+ x y))").expect("parse ok");
    let Expr::Let { bindings, body, .. } = e else {
        panic!("expected let");
    };
    assert_eq!(bindings.len(), 2);
    assert_eq!(body.len(), 1);

    let e = parse_expr("(match s ((Shape.Circle r) r) (_ 0))").expect("parse ok");
    let Expr::Match { cases, .. } = e else {
        panic!("expected match");
    };
    assert_eq!(cases.len(), 2);
    assert!(matches!(
        &cases[0].pattern,
        Pattern::Constructor { type_name, case, binding: Some(b), .. }
            if type_name == "Shape" && case == "Circle" && b == "r"
    ));
    assert!(matches!(&cases[1].pattern, Pattern::Wildcard(_)));
}

#[test]
fn qualified_call_with_version_binds_to_target() {
    let e = parse_expr("(billing.compute :v2.0.0 x)").expect("parse ok");
    let Expr::Call {
        target,
        version,
        args,
        ..
    } = e
    else {
        panic!("expected call");
    };
    assert_eq!(target, "billing.compute");
    assert_eq!(version.as_deref(), Some("v2.0.0"));
    assert_eq!(args.len(), 1);
}

#[test]
fn minus_is_negation_with_one_argument() {
    let e = parse_expr("(- 5)").expect("parse ok");
    assert!(matches!(e, Expr::UnaryOp { .. }));

    let e = parse_expr("(- a b)").expect("parse ok");
    assert!(matches!(
        e,
        Expr::BinaryOp {
            op: BinaryOperator::Sub,
            ..
        }
    ));
}

#[test]
fn generic_type_expressions() {
    let src = r#"
    (mod m
      (fn f :inputs [(xs (List :int)) (kv (Map :string :int))] :outputs [(r :int)]
        (body 0)))
    "#;
    let module = parse_source(src).expect("parse ok");
    let ModuleElement::Function(f) = &module.elements[0] else {
        panic!("expected function");
    };
    assert_eq!(f.inputs[0].ty.to_string(), "List<int>");
    assert_eq!(f.inputs[1].ty.to_string(), "Map<string, int>");
    assert!(matches!(f.outputs[0].ty, TypeExpr::Primitive(_)));
}

#[test]
fn parse_error_reports_expected_and_got() {
    let err = parse_source("(mod m (fn f :inputs 42 (body 1)))").expect_err("expected error");
    assert!(err.message.starts_with("expected"), "got: {}", err.message);
    assert!(err.message.contains("got"), "got: {}", err.message);
}

#[test]
fn optional_parameters() {
    let src = r#"
    (mod m
      (fn f :inputs [(a :int) (b :int :optional true) (c :int ?)] :outputs []
        (body 0)))
    "#;
    let module = parse_source(src).expect("parse ok");
    let ModuleElement::Function(f) = &module.elements[0] else {
        panic!("expected function");
    };
    assert!(!f.inputs[0].optional);
    assert!(f.inputs[1].optional);
    assert!(f.inputs[2].optional);
}
