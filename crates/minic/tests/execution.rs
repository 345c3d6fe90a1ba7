//! End-to-end runs through the public API: source in, PRINT stream out.

use minic::{CollectPrint, Executor, NoInput, RunError, ScriptedInput};

const PRELUDE: &str = "extern int GET();
extern void * MALLOC(int);
extern void FREE(void *);
extern void PRINT(int);
";

fn run_collect(source: &str) -> (i64, Vec<i64>) {
    run_with_input(source, [])
}

fn run_with_input(source: &str, input: impl IntoIterator<Item = i64>) -> (i64, Vec<i64>) {
    let full = format!("{PRELUDE}{source}");
    let exec = Executor::new(&full, "test.c").expect("program should parse");
    let mut out = CollectPrint::default();
    let mut input = ScriptedInput::new(input);
    let exit = exec.run(&mut input, &mut out).expect("program should run");
    (exit, out.values)
}

fn run_err(source: &str) -> RunError {
    let full = format!("{PRELUDE}{source}");
    let exec = Executor::new(&full, "test.c").expect("program should parse");
    let mut out = CollectPrint::default();
    exec.run(&mut NoInput, &mut out)
        .expect_err("program should fail")
}

#[test]
fn arithmetic_and_branching() {
    let (exit, printed) = run_collect(
        "int main() { int a = 10, b = 20; if (a < b) PRINT(a + b); else PRINT(a - b); return 0; }",
    );
    assert_eq!(exit, 0);
    assert_eq!(printed, vec![30]);
}

#[test]
fn while_loop_accumulates() {
    let (_, printed) = run_collect(
        "int main() { int i = 0, s = 0; while (i < 5) { s = s + i; i = i + 1; } PRINT(s); return 0; }",
    );
    assert_eq!(printed, vec![10]);
}

#[test]
fn for_loop_accumulates() {
    let (_, printed) = run_collect(
        "int main() { int i, s = 0; for (i = 0; i < 5; i = i + 1) { s = s + i; } PRINT(s); return 0; }",
    );
    assert_eq!(printed, vec![10]);
}

#[test]
fn for_without_condition_relies_on_return() {
    let (_, printed) = run_collect(
        "int f(int n) { for (;;) { if (n > 3) return n; n = n + 1; } }
         int main() { PRINT(f(0)); return 0; }",
    );
    assert_eq!(printed, vec![4]);
}

#[test]
fn recursion_computes_factorial() {
    let (_, printed) = run_collect(
        "int fact(int n) { if (n == 0) return 1; return n * fact(n - 1); }
         int main() { PRINT(fact(5)); return 0; }",
    );
    assert_eq!(printed, vec![120]);
}

#[test]
fn local_arrays_index_by_words() {
    let (_, printed) = run_collect(
        "int main() { int a[3]; a[0] = 7; a[1] = 8; a[2] = 9; PRINT(a[0] + a[1] + a[2]); return 0; }",
    );
    assert_eq!(printed, vec![24]);
}

#[test]
fn heap_pointer_arithmetic_scales_by_pointee() {
    let (_, printed) = run_collect(
        "int main() {
             int* p = (int*)MALLOC(2 * sizeof(int));
             *p = 11;
             *(p + 1) = 31;
             PRINT(*p + *(p + 1));
             FREE(p);
             return 0;
         }",
    );
    assert_eq!(printed, vec![42]);
}

#[test]
fn char_heap_loads_single_bytes() {
    let (_, printed) = run_collect(
        "int main() {
             char* a;
             char* b;
             a = (char*)MALLOC(4);
             b = (char*)MALLOC(2);
             *a = 42;
             *b = 43;
             PRINT((int)*a);
             PRINT((int)*b);
             FREE(a);
             return 0;
         }",
    );
    assert_eq!(printed, vec![42, 43]);
}

#[test]
fn get_reads_scripted_integers() {
    let (_, printed) = run_with_input(
        "int main() { int a = GET(); int b = GET(); PRINT(a + b); return 0; }",
        [5, 7],
    );
    assert_eq!(printed, vec![12]);
}

#[test]
fn assignment_is_an_expression() {
    let (_, printed) = run_collect(
        "int main() { int a, b; a = b = 5; PRINT(a); PRINT(b); PRINT(a = 9); return 0; }",
    );
    assert_eq!(printed, vec![5, 5, 9]);
}

#[test]
fn pointer_round_trip_law() {
    let (_, printed) = run_collect(
        "int main() {
             int* p = (int*)MALLOC(4 * sizeof(int));
             *(p + 2) = 9;
             PRINT(*(p + 2));
             PRINT((p + 2) - 2 == p);
             FREE(p);
             return 0;
         }",
    );
    assert_eq!(printed, vec![9, 1]);
}

#[test]
fn sizeof_reports_widths() {
    let (_, printed) = run_collect(
        "int main() {
             int a[5];
             PRINT(sizeof(char));
             PRINT(sizeof(int));
             PRINT(sizeof(int*));
             PRINT(sizeof(a));
             return 0;
         }",
    );
    assert_eq!(printed, vec![1, 8, 8, 5 * 8]);
}

#[test]
fn variable_length_arrays_size_at_declaration() {
    let (_, printed) = run_collect(
        "int main() {
             int n = 3;
             int a[n];
             a[2] = 5;
             PRINT(sizeof(a));
             PRINT(a[2]);
             return 0;
         }",
    );
    assert_eq!(printed, vec![24, 5]);
}

#[test]
fn globals_live_on_the_heap() {
    let (_, printed) = run_collect(
        "int counter = 10;
         char flag = 'a';
         int bump(int by) { counter = counter + by; return counter; }
         int main() { PRINT(bump(5)); PRINT(counter); PRINT((int)flag); return 0; }",
    );
    assert_eq!(printed, vec![15, 15, 97]);
}

#[test]
fn global_arrays_are_heap_resident() {
    let (_, printed) = run_collect(
        "int table[4];
         int main() { table[0] = 3; table[3] = 9; PRINT(table[0] + table[3]); return 0; }",
    );
    assert_eq!(printed, vec![12]);
}

#[test]
fn double_pointers_store_pointer_words() {
    let (_, printed) = run_collect(
        "int main() {
             int* p = (int*)MALLOC(sizeof(int));
             int** q = (int**)MALLOC(sizeof(int*));
             *q = p;
             **q = 77;
             PRINT(*p);
             FREE(q);
             FREE(p);
             return 0;
         }",
    );
    assert_eq!(printed, vec![77]);
}

#[test]
fn local_arrays_decay_when_passed_to_functions() {
    let (_, printed) = run_collect(
        "int sum3(int* a) { return a[0] + a[1] + a[2]; }
         int main() {
             int b[3];
             b[0] = 1;
             b[1] = 2;
             b[2] = 3;
             PRINT(sum3(b));
             return 0;
         }",
    );
    assert_eq!(printed, vec![6]);
}

#[test]
fn callees_can_write_through_caller_arrays() {
    let (_, printed) = run_collect(
        "void fill(int* a, int n) { int i; for (i = 0; i < n; i = i + 1) a[i] = i * 10; }
         int main() {
             int b[3];
             fill(b, 3);
             PRINT(b[0] + b[1] + b[2]);
             return 0;
         }",
    );
    assert_eq!(printed, vec![30]);
}

#[test]
fn pointers_can_alias_local_arrays() {
    let (_, printed) = run_collect(
        "int main() {
             int b[3];
             int* p = b;
             *p = 4;
             p[1] = 5;
             *(p + 2) = 6;
             PRINT(b[0] + b[1] + b[2]);
             return 0;
         }",
    );
    assert_eq!(printed, vec![15]);
}

#[test]
fn block_scopes_shadow_without_clobbering() {
    let (_, printed) = run_collect(
        "int main() { int x = 1; { int x = 2; PRINT(x); } PRINT(x); return 0; }",
    );
    assert_eq!(printed, vec![2, 1]);
}

#[test]
fn early_return_suppresses_the_rest_of_the_function() {
    let (_, printed) = run_collect(
        "int f() { return 1; PRINT(99); return 2; }
         int main() { PRINT(f()); return 0; }",
    );
    assert_eq!(printed, vec![1]);
}

#[test]
fn return_breaks_out_of_loops() {
    let (_, printed) = run_collect(
        "int f(int n) { while (1) { if (n > 3) return n; n = n + 1; } }
         int main() { PRINT(f(0)); PRINT(5); return 0; }",
    );
    assert_eq!(printed, vec![4, 5]);
}

#[test]
fn nested_calls_do_not_corrupt_caller_caches() {
    let (_, printed) = run_collect(
        "int g(int x) { return x * 2; }
         int f(int x) { return g(x) + g(x + 1); }
         int main() { PRINT(f(3)); return 0; }",
    );
    assert_eq!(printed, vec![14]);
}

#[test]
fn a_body_that_falls_through_returns_zero() {
    let (exit, printed) = run_collect(
        "int f() { ; }
         int main() { PRINT(f()); PRINT(3); }",
    );
    // both the callee and main fall off the end of their bodies
    assert_eq!(printed, vec![0, 3]);
    assert_eq!(exit, 0);
}

#[test]
fn main_return_word_is_the_exit_value() {
    let (exit, _) = run_collect("int main() { return 3; }");
    assert_eq!(exit, 3);
}

#[test]
fn zero_byte_malloc_still_returns_an_address() {
    let (_, printed) = run_collect(
        "int main() { int* p = (int*)MALLOC(0); PRINT(p == 0); FREE(p); return 0; }",
    );
    assert_eq!(printed, vec![0]);
}

#[test]
fn freed_region_is_reused_at_the_same_address() {
    let (_, printed) = run_collect(
        "int main() {
             int* p = (int*)MALLOC(16);
             FREE(p);
             int* q = (int*)MALLOC(16);
             PRINT(p == q);
             FREE(q);
             return 0;
         }",
    );
    assert_eq!(printed, vec![1]);
}

#[test]
fn division_by_zero_is_fatal() {
    assert_eq!(
        run_err("int main() { int z = 0; PRINT(1 / z); return 0; }"),
        RunError::DivisionByZero
    );
}

#[test]
fn remainder_by_zero_is_fatal() {
    assert_eq!(
        run_err("int main() { int z = 0; PRINT(1 % z); return 0; }"),
        RunError::DivisionByZero
    );
}

#[test]
fn freeing_an_unknown_address_is_fatal() {
    assert_eq!(run_err("int main() { FREE(5); return 0; }"), RunError::UnknownFree(5));
}

#[test]
fn double_free_is_fatal() {
    let err = run_err(
        "int main() { int* p = (int*)MALLOC(8); FREE(p); FREE(p); return 0; }",
    );
    assert!(matches!(err, RunError::UnknownFree(_)));
}

#[test]
fn dereferencing_null_is_fatal() {
    assert_eq!(
        run_err("int main() { int* p; PRINT(*p); return 0; }"),
        RunError::BadAddress(0)
    );
}

#[test]
fn consuming_a_void_call_is_fatal() {
    assert!(matches!(
        run_err("int main() { int x = PRINT(3); return 0; }"),
        RunError::UncachedValue(_)
    ));
}

#[test]
fn a_program_without_main_is_fatal() {
    let exec = Executor::new("int helper() { return 0; }", "test.c").unwrap();
    let mut out = CollectPrint::default();
    assert_eq!(
        exec.run(&mut NoInput, &mut out).unwrap_err(),
        RunError::MissingEntry
    );
}

#[test]
fn exhausted_input_is_fatal() {
    let err = run_err("int main() { PRINT(GET()); return 0; }");
    assert!(matches!(err, RunError::Input(_)));
}
