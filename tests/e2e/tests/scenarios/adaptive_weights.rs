//! Hybrid adaptive weighting over real queries.

use mnemo_e2e_tests::stack;

#[tokio::test]
async fn single_technical_token_favors_vectors() {
    let (stack, _dir) = stack();
    let weights = stack.hybrid.weights_for("api");
    assert!(weights.vector >= 0.7, "got {weights:?}");
    assert!(weights.text <= 0.3, "got {weights:?}");
}

#[tokio::test]
async fn phrase_query_favors_text() {
    let (stack, _dir) = stack();
    let weights = stack.hybrid.weights_for("how do I configure the cache");
    assert!(weights.text >= 0.5, "got {weights:?}");
}

#[tokio::test]
async fn weights_always_normalize_and_stay_bounded() {
    let (stack, _dir) = stack();
    for query in [
        "api",
        "sql",
        "x",
        "deploy",
        "how do we rotate the signing keys",
        "two words",
        "a slightly longer freeform question about nothing in particular",
    ] {
        let weights = stack.hybrid.weights_for(query);
        assert!(
            (weights.vector + weights.text - 1.0).abs() < 1e-9,
            "query {query:?}: {weights:?}"
        );
        assert!(weights.vector >= 0.2 && weights.text >= 0.2, "query {query:?}");
    }
}

#[tokio::test]
async fn weights_are_memoized_per_normalized_query() {
    let (stack, _dir) = stack();
    let first = stack.hybrid.weights_for("API");
    let second = stack.hybrid.weights_for("  api  ");
    assert_eq!(first, second);
}
