/// Narrow interface the broker needs from a consumer, satisfied by whichever
/// concrete consumer type (thread pool, TCP server) enrolls itself.
///
/// Kept deliberately small and broker-crate-local so the broker never has to
/// depend on the consumer crates -- those crates depend on the broker
/// instead, to call [`crate::Broker::get`] and [`crate::Broker::put`].
pub trait ConsumerHandle: Send + Sync {
    /// Short, stable identifier of this consumer's kind (e.g. `"btc"`, `"ws"`).
    /// The broker refuses to enroll a second consumer of the same mnemonic.
    fn mnemonic(&self) -> &'static str;

    /// Launch whatever worker threads or tasks this consumer needs. Must not block.
    fn async_start_processing(&self);

    /// Request termination. Safe to call more than once.
    fn shutdown(&self);
}
