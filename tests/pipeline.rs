use monkey::{Error, Object, RuntimeError, Session};

fn eval(source: &str) -> Object {
    match Session::new().eval(source) {
        Ok(value) => value,
        Err(e) => panic!("source:\n{}\nerror: {}", source, e),
    }
}

fn int(n: i64) -> Object {
    Object::Integer(n)
}

#[test]
fn test_map_and_reduce() {
    let source = r#"
        let map = fn(arr, f) {
            let iter = fn(arr, accumulated) {
                if (len(arr) == 0) {
                    accumulated
                } else {
                    iter(rest(arr), push(accumulated, f(first(arr))));
                }
            };
            iter(arr, []);
        };

        let reduce = fn(arr, initial, f) {
            let iter = fn(arr, result) {
                if (len(arr) == 0) {
                    result
                } else {
                    iter(rest(arr), f(result, first(arr)));
                }
            };
            iter(arr, initial);
        };

        let doubled = map([1, 2, 3, 4], fn(x) { x * 2 });
        reduce(doubled, 0, fn(acc, x) { acc + x });
    "#;
    assert_eq!(eval(source), int(20));
}

#[test]
fn test_fibonacci() {
    let source = "
        let fib = fn(n) { if (n < 2) { n } else { fib(n - 1) + fib(n - 2) } };
        fib(20);
    ";
    assert_eq!(eval(source), int(6765));
}

#[test]
fn test_counter_closures() {
    let source = "
        let makeCounter = fn(start) {
            fn(step) { start + step }
        };
        let fromTen = makeCounter(10);
        let fromHundred = makeCounter(100);
        [fromTen(1), fromHundred(1), fromTen(5)];
    ";
    assert_eq!(
        eval(source),
        Object::array(vec![int(11), int(101), int(15)])
    );
}

#[test]
fn test_hash_lookup_by_computed_key() {
    let source = r#"
        let people = [{"name": "Alice", "age": 24}, {"name": "Anna", "age": 28}];
        let getAge = fn(person) { person["age"] };
        getAge(people[0]) + getAge(people[1]);
    "#;
    assert_eq!(eval(source), int(52));
}

#[test]
fn test_string_building() {
    let source = r#"
        let greet = fn(name) { "Hello, " + name + "!" };
        greet("monkey");
    "#;
    assert_eq!(eval(source), Object::string("Hello, monkey!"));
}

#[test]
fn test_comments_are_ignored() {
    let source = "
        // adds two numbers
        let add = fn(a, b) { a + b }; // trailing
        add(2, 3)
    ";
    assert_eq!(eval(source), int(5));
}

#[test]
fn test_interactive_sequence() {
    let mut session = Session::new();
    session.eval("let x = 10;").unwrap();
    session.eval("let double = fn(n) { n * 2 };").unwrap();
    assert_eq!(session.eval("double(x)").unwrap(), int(20));

    // errors do not end the session
    assert!(session.eval("double(").is_err());
    assert!(session.eval("undefinedName").is_err());
    assert_eq!(session.eval("double(double(x))").unwrap(), int(40));
}

#[test]
fn test_runtime_error_surfaces_through_session() {
    let err = Session::new().eval("let a = [1, 2]; a + 1").unwrap_err();
    match err {
        Error::Runtime {
            error: RuntimeError::TypeMismatch { op, left, right },
            ..
        } => {
            assert_eq!((op, left, right), ("+", "array", "integer"));
        }
        other => panic!("expected type mismatch, got {:?}", other),
    }
}

#[test]
fn test_return_at_top_level_is_a_compile_error() {
    let err = Session::new().eval("return 5;").unwrap_err();
    assert!(matches!(err, Error::Compile(_)), "{:?}", err);
    assert!(err.to_string().contains("hint:"), "{}", err);
}

#[test]
fn test_bytecode_can_be_shipped_and_run() {
    use monkey::frontend::{Lexer, Parser};
    use monkey::{Bytecode, Compiler, Vm};

    let mut parser = Parser::new(Lexer::new("let sq = fn(x) { x * x }; sq(7)"));
    let program = parser.parse_program();
    assert!(parser.errors().is_empty());

    let mut compiler = Compiler::new();
    compiler.compile(&program).unwrap();
    let bytes = compiler.bytecode().to_bytes().unwrap();

    let mut vm = Vm::new(Bytecode::from_bytes(&bytes).unwrap());
    vm.run().unwrap();
    assert_eq!(vm.last_popped_stack_elem(), int(49));
}
