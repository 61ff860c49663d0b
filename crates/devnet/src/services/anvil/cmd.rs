//! Command builder for Anvil.

use std::time::Duration;

/// Builder for Anvil arguments.
#[derive(Debug, Clone)]
pub struct AnvilCmdBuilder {
    port: u16,
    order: String,
    disable_block_gas_limit: bool,
    gas_price: u64,
    block_time: Duration,
    extra_args: Vec<String>,
}

impl AnvilCmdBuilder {
    /// Create a new Anvil command builder for the given port.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            order: "fifo".to_string(),
            disable_block_gas_limit: true,
            gas_price: 0,
            block_time: Duration::from_secs(2),
            extra_args: Vec::new(),
        }
    }

    /// Set the interval between mined blocks.
    pub fn block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time;
        self
    }

    /// Set the transaction ordering.
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = order.into();
        self
    }

    /// Set the gas price.
    pub fn gas_price(mut self, gas_price: u64) -> Self {
        self.gas_price = gas_price;
        self
    }

    /// Enable or disable the block gas limit.
    pub fn disable_block_gas_limit(mut self, disabled: bool) -> Self {
        self.disable_block_gas_limit = disabled;
        self
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the arguments as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "--port".to_string(),
            self.port.to_string(),
            "--order".to_string(),
            self.order,
        ];

        if self.disable_block_gas_limit {
            cmd.push("--disable-block-gas-limit".to_string());
        }

        cmd.push("--gas-price".to_string());
        cmd.push(self.gas_price.to_string());

        // Whole seconds render without a fractional part.
        cmd.push("--block-time".to_string());
        cmd.push(self.block_time.as_secs_f64().to_string());

        cmd.extend(self.extra_args);

        cmd
    }
}
